use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use regflow_core::Identity;

const ADJECTIVES: &[&str] = &[
    "happy", "blue", "fast", "bright", "cool", "dark", "brave", "calm", "wise", "bold",
    "quick", "silent", "strong", "gentle", "wild", "free", "clever", "honest", "kind",
    "lucky", "noble", "proud", "swift", "warm", "golden", "hidden", "silver", "stellar",
];

const NOUNS: &[&str] = &[
    "cloud", "tiger", "river", "mountain", "ocean", "forest", "valley", "eagle", "wolf",
    "bear", "lion", "hawk", "fox", "deer", "whale", "storm", "thunder", "star", "moon",
    "crystal", "amber", "pearl", "arrow", "blade", "crown", "flame", "heart", "light",
];

/// Display name made of two capitalised words, e.g. "Brave Falcon".
pub fn generate_word_name() -> String {
    let mut rng = rand::thread_rng();
    let adj = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("river");
    format!("{} {}", capitalise(adj), capitalise(noun))
}

/// Random alphanumeric name of `len` characters.
pub fn generate_random_name(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh identity for one run.
pub fn generate_identity(name_length: Option<usize>) -> Identity {
    match name_length {
        Some(len) if len > 0 => Identity::new(generate_random_name(len)),
        _ => Identity::new(generate_word_name()),
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
