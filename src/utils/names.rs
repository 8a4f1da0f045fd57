//! Random tokens and generated names

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "dapper", "eager", "fancy", "gentle", "happy", "jolly", "keen",
    "lively", "mellow", "nimble", "plucky", "quirky", "rapid", "sunny", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beaver", "comet", "falcon", "gecko", "heron", "koala", "lemur", "lynx", "marmot",
    "otter", "panda", "puffin", "quokka", "raven", "salmon", "tapir", "walrus", "wombat", "yak",
];

/// Random token of exactly `len` ASCII letters and digits
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Two-word lowercase name such as `plucky-otter`
pub fn silly_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("jolly");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
    format!("{}-{}", adjective, noun)
}
