//! Human readable pseudonyms ("Brave Falcon").

use crate::env::Environment;

const ADJECTIVES: [&str; 30] = [
    "brave", "clever", "happy", "swift", "calm", "bold", "bright", "quick", "gentle", "kind",
    "wise", "cool", "epic", "fancy", "grand", "jolly", "keen", "lucky", "merry", "noble", "proud",
    "quiet", "rapid", "sharp", "smart", "sunny", "super", "tiny", "vast", "warm",
];

const ANIMALS: [&str; 30] = [
    "falcon", "dolphin", "penguin", "tiger", "eagle", "panda", "koala", "otter", "fox", "owl",
    "wolf", "bear", "hawk", "lynx", "raven", "shark", "whale", "seal", "deer", "hare", "crane",
    "finch", "gecko", "ibis", "jay", "kiwi", "lemur", "moose", "newt", "ocelot",
];

/// Generate an "Adjective Animal" name from the environment RNG.
pub fn generate_name(env: &dyn Environment) -> String {
    let adjective = ADJECTIVES[env.random_index(ADJECTIVES.len())];
    let animal = ANIMALS[env.random_index(ANIMALS.len())];
    format!("{} {}", capitalize(adjective), capitalize(animal))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
