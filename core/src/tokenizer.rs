use crate::error::{LexisError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{M}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::Spanish);
    static ref DEFAULT_ANALYZER: SpanishAnalyzer = SpanishAnalyzer::new();
    // Stored in folded form: the check runs after diacritics are removed.
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","al","algo","algunas","algunos","ante","antes","como","con","contra","cual","cuando",
            "de","del","desde","donde","durante","e","el","ella","ellas","ellos","en","entre","era","erais","eramos","eran","eras","eres",
            "es","esa","esas","ese","eso","esos","esta","estaba","estado","estais","estamos","estan","estar","estas","este","esto","estos","estoy",
            "fue","fueron","fui","fuimos","ha","habia","han","has","hasta","hay","he","la","las","le","les","lo","los",
            "mas","me","mi","mia","mias","mio","mios","mis","mucho","muchos","muy","nada","ni","no","nos","nosotras","nosotros",
            "nuestra","nuestras","nuestro","nuestros","o","os","otra","otras","otro","otros","para","pero","poco","por","porque",
            "que","quien","quienes","se","sea","sean","ser","si","sido","sin","sobre","sois","somos","son","soy","su","sus","suya","suyas","suyo","suyos",
            "tambien","tanto","te","tenia","tengo","ti","tiene","tienen","todo","todos","tu","tus","tuya","tuyas","tuyo","tuyos",
            "un","una","uno","unos","vosotras","vosotros","vuestra","vuestras","vuestro","vuestros","y","ya","yo"
        ];
        words.iter().copied().collect()
    };
}

/// Pluggable text analysis. `normalize` runs once over the whole text; `term` maps each
/// word found in the normalized text to an index term, or drops it.
pub trait Analyzer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
    fn term(&self, word: &str) -> Option<String>;
}

/// Lowercasing, Spanish diacritic folding (ñ is kept), stop words and optional Snowball stemming.
#[derive(Debug, Clone, Copy)]
pub struct SpanishAnalyzer {
    stem: bool,
}

impl SpanishAnalyzer {
    pub fn new() -> Self { Self { stem: true } }
    pub fn without_stemming() -> Self { Self { stem: false } }
}

impl Default for SpanishAnalyzer {
    fn default() -> Self { Self::new() }
}

impl Analyzer for SpanishAnalyzer {
    fn normalize(&self, text: &str) -> String {
        fold_diacritics(&text.nfkc().collect::<String>().to_lowercase())
    }

    fn term(&self, word: &str) -> Option<String> {
        if is_stopword(word) { return None; }
        if !self.stem { return Some(word.to_string()); }
        let stem = STEMMER.stem(word);
        if stem.is_empty() { Some(word.to_string()) } else { Some(stem.into_owned()) }
    }
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Strip combining marks except the tilde of ñ, then recompose.
fn fold_diacritics(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut base = '\0';
    for c in s.nfd() {
        if is_combining_mark(c) {
            if c == '\u{0303}' && base == 'n' { out.push(c); }
            continue;
        }
        out.push(c);
        base = c;
    }
    out.nfc().collect()
}

/// Lazily analyzed text. Owns the normalized buffer; `iter` can be called any number of times.
pub struct TokenStream<'a> {
    analyzer: &'a dyn Analyzer,
    buffer: String,
}

impl<'a> TokenStream<'a> {
    /// (term, position) pairs in document order. Dropped words still consume a position.
    pub fn iter(&self) -> impl Iterator<Item = (String, u32)> + '_ {
        WORD.find_iter(&self.buffer)
            .enumerate()
            .filter_map(move |(pos, m)| self.analyzer.term(m.as_str()).map(|t| (t, pos as u32)))
    }
}

pub fn analyze<'a>(analyzer: &'a dyn Analyzer, text: &str) -> TokenStream<'a> {
    TokenStream { analyzer, buffer: analyzer.normalize(text) }
}

/// Decode `bytes` as UTF-8 (a leading BOM is skipped) and analyze the result.
pub fn analyze_bytes<'a>(analyzer: &'a dyn Analyzer, source: &str, bytes: &[u8]) -> Result<TokenStream<'a>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| LexisError::Decoding {
        source_name: source.to_string(),
        offset: e.valid_up_to(),
    })?;
    Ok(analyze(analyzer, text))
}

/// Tokenize text with the default Spanish analyzer into (term, position).
pub fn tokenize(text: &str) -> Vec<(String, u32)> {
    analyze(&*DEFAULT_ANALYZER, text).iter().collect()
}
