//! Character trigram language classifier
//!
//! Each language is a frequency table of lowercase character trigrams built
//! from a small embedded corpus. Text is scored by its mean log probability
//! under each table and the best-scoring language wins. Good enough for
//! sentence-length strings in the bundled languages; short or mixed-language
//! strings will be misclassified now and then.

use std::collections::HashMap;

use super::Classifier;
use crate::error::ClassifyError;
use crate::types::LanguageCode;

const N: usize = 3;

const CORPUS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the quick brown fox jumps over the lazy dog",
            "this is a short sentence written in english",
            "where is the nearest train station please",
            "we would like to thank you for all of your help",
            "they have been working on the project for three years",
            "what time does the shop open in the morning",
            "the weather is nice today and the sun is shining",
        ],
    ),
    (
        "de",
        &[
            "der schnelle braune fuchs springt über den faulen hund",
            "dies ist ein kurzer satz in deutscher sprache",
            "wo ist bitte der nächste bahnhof",
            "wir möchten uns herzlich für ihre hilfe bedanken",
            "sie arbeiten seit drei jahren an diesem projekt",
            "wann öffnet das geschäft am morgen",
            "das wetter ist heute schön und die sonne scheint",
        ],
    ),
    (
        "fr",
        &[
            "le renard brun rapide saute par dessus le chien paresseux",
            "ceci est une phrase courte écrite en français",
            "où se trouve la gare la plus proche s'il vous plaît",
            "nous voudrions vous remercier pour toute votre aide",
            "ils travaillent sur ce projet depuis trois ans",
            "à quelle heure le magasin ouvre t il le matin",
            "il fait beau aujourd'hui et le soleil brille",
        ],
    ),
    (
        "es",
        &[
            "el rápido zorro marrón salta sobre el perro perezoso",
            "esta es una frase corta escrita en español",
            "dónde está la estación de tren más cercana por favor",
            "queremos darle las gracias por toda su ayuda",
            "llevan tres años trabajando en este proyecto",
            "a qué hora abre la tienda por la mañana",
            "hoy hace buen tiempo y el sol está brillando",
        ],
    ),
    (
        "pt",
        &[
            "a rápida raposa marrom pula sobre o cão preguiçoso",
            "esta é uma frase curta escrita em português",
            "onde fica a estação de comboio mais próxima por favor",
            "gostaríamos de agradecer por toda a sua ajuda",
            "eles estão a trabalhar neste projeto há três anos",
            "a que horas abre a loja de manhã",
            "hoje o tempo está bom e o sol está a brilhar",
        ],
    ),
    (
        "it",
        &[
            "la veloce volpe marrone salta sopra il cane pigro",
            "questa è una frase breve scritta in italiano",
            "dove si trova la stazione ferroviaria più vicina per favore",
            "vorremmo ringraziarvi per tutto il vostro aiuto",
            "lavorano a questo progetto da tre anni",
            "a che ora apre il negozio la mattina",
            "oggi il tempo è bello e il sole splende",
        ],
    ),
    (
        "nl",
        &[
            "de snelle bruine vos springt over de luie hond",
            "dit is een korte zin geschreven in het nederlands",
            "waar is het dichtstbijzijnde treinstation alstublieft",
            "wij willen u graag bedanken voor al uw hulp",
            "zij werken al drie jaar aan dit project",
            "hoe laat gaat de winkel 's ochtends open",
            "het weer is vandaag mooi en de zon schijnt",
        ],
    ),
];

/// Trigram frequencies for one language
#[derive(Debug, Default)]
struct Profile {
    counts: HashMap<String, u32>,
    total: u32,
}

impl Profile {
    fn train(&mut self, text: &str) {
        for gram in trigrams(text) {
            *self.counts.entry(gram).or_insert(0) += 1;
            self.total += 1;
        }
    }

    /// Mean log probability of `grams`; unseen trigrams get `1 / (total + 1)`
    fn score(&self, grams: &[String]) -> f64 {
        let total = f64::from(self.total);
        let unseen = (1.0 / (total + 1.0)).ln();

        let sum: f64 = grams
            .iter()
            .map(|gram| match self.counts.get(gram) {
                Some(&count) => (f64::from(count) / total).ln(),
                None => unseen,
            })
            .sum();

        sum / grams.len() as f64
    }
}

/// Lowercased letters with every other run of characters collapsed to one
/// space, padded so word boundaries form trigrams of their own
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphabetic() {
            out.push(c);
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    if !out.ends_with(' ') {
        out.push(' ');
    }
    out
}

fn trigrams(text: &str) -> Vec<String> {
    let chars: Vec<char> = normalize(text).chars().collect();
    chars.windows(N).map(|w| w.iter().collect()).collect()
}

/// Language classifier over character trigram profiles
#[derive(Debug)]
pub struct NgramClassifier {
    /// Kept in insertion order so equal scores resolve deterministically
    profiles: Vec<(LanguageCode, Profile)>,
}

impl NgramClassifier {
    /// Classifier trained on the bundled corpus (en, de, fr, es, pt, it, nl)
    pub fn new() -> Self {
        let mut classifier = Self::empty();
        for (code, sentences) in CORPUS {
            for sentence in *sentences {
                classifier.train(code, sentence);
            }
        }
        classifier
    }

    /// Classifier with no languages; train it before use
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Add training text for `code`, creating the language if needed
    pub fn train(&mut self, code: &str, text: &str) {
        let index = match self.profiles.iter().position(|(c, _)| c.as_str() == code) {
            Some(index) => index,
            None => {
                self.profiles.push((LanguageCode::new(code), Profile::default()));
                self.profiles.len() - 1
            },
        };
        self.profiles[index].1.train(text);
    }

    pub fn languages(&self) -> impl Iterator<Item = &LanguageCode> {
        self.profiles.iter().map(|(code, _)| code)
    }
}

impl Default for NgramClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for NgramClassifier {
    fn classify(&self, text: &str) -> Result<LanguageCode, ClassifyError> {
        if !text.chars().any(char::is_alphabetic) {
            return Err(ClassifyError::NoSignal);
        }

        let grams = trigrams(text);
        let mut best: Option<(&LanguageCode, f64)> = None;
        for (code, profile) in &self.profiles {
            if profile.total == 0 {
                continue;
            }
            let score = profile.score(&grams);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((code, score));
            }
        }

        best.map(|(code, _)| code.clone())
            .ok_or_else(|| ClassifyError::Detector("no trained language profiles".to_string()))
    }
}
