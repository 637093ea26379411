use lexis_core::tokenizer::{analyze, tokenize, SpanishAnalyzer};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Los GATOS corren. El gato corrió.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Plural and singular share a stem
    assert_eq!(words[0], words[2]);
    assert!(!words.iter().any(|w| w.chars().any(|c| c.is_uppercase())));
}

#[test]
fn it_folds_accents_but_not_enye() {
    let analyzer = SpanishAnalyzer::without_stemming();
    let stream = analyze(&analyzer, "Canción del AÑO, pingüino");
    let words: Vec<String> = stream.iter().map(|(w, _)| w).collect();
    assert_eq!(words, vec!["cancion", "año", "pinguino"]);
}

#[test]
fn it_filters_stopwords_and_keeps_positions() {
    let analyzer = SpanishAnalyzer::without_stemming();
    let toks: Vec<(String, u32)> = analyze(&analyzer, "El perro y el gato").iter().collect();
    assert_eq!(toks, vec![("perro".to_string(), 1), ("gato".to_string(), 4)]);
}
