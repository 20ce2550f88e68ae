//! Fake data generation for factories

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack",
    "Kate", "Liam", "Mia", "Noah", "Olivia", "Peter", "Quinn", "Ruby", "Sam", "Tina",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Davis", "Evans", "Fisher", "Garcia", "Harris", "Johnson", "King", "Lopez",
    "Miller", "Nelson", "Parker", "Roberts", "Smith", "Taylor", "Williams", "Young", "Zhang", "Clark",
];

const DOMAINS: &[&str] = &["example.com", "test.org", "demo.net", "sample.io", "fake.dev"];

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
];

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// Reseed this thread's generator for deterministic output
pub fn seed_fake_data(seed: u64) {
    RNG.with(|rng| {
        *rng.borrow_mut() = StdRng::seed_from_u64(seed);
    });
}

/// Random number between `min` and `max` inclusive; reversed bounds are swapped
pub fn random_range(min: i32, max: i32) -> i32 {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    RNG.with(|rng| rng.borrow_mut().gen_range(low..=high))
}

/// `true` with the given probability (default 0.5), clamped to `0.0..=1.0`.
/// NaN counts as 0.5.
pub fn random_bool(probability: Option<f64>) -> bool {
    let prob = match probability {
        Some(p) if p.is_nan() => 0.5,
        Some(p) => p.clamp(0.0, 1.0),
        None => 0.5,
    };
    RNG.with(|rng| rng.borrow_mut().gen_bool(prob))
}

fn pick(items: &[&'static str]) -> &'static str {
    RNG.with(|rng| items.choose(&mut *rng.borrow_mut()).copied().unwrap_or_default())
}

pub fn fake_first_name() -> String {
    pick(FIRST_NAMES).to_string()
}

pub fn fake_last_name() -> String {
    pick(LAST_NAMES).to_string()
}

pub fn fake_name() -> String {
    format!("{} {}", fake_first_name(), fake_last_name())
}

pub fn fake_email() -> String {
    format!(
        "{}{:03}@{}",
        pick(FIRST_NAMES).to_lowercase(),
        random_range(1, 999),
        pick(DOMAINS)
    )
}

pub fn fake_username() -> String {
    format!("{}_{}", pick(FIRST_NAMES).to_lowercase(), random_range(10, 9999))
}

pub fn fake_word() -> String {
    pick(WORDS).to_string()
}

/// A capitalised sentence of 4 to 10 words
pub fn fake_sentence() -> String {
    let count = random_range(4, 10) as usize;
    let words: Vec<&str> = (0..count).map(|_| pick(WORDS)).collect();

    let mut sentence = words.join(" ");
    if let Some(first) = sentence.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    sentence.push('.');
    sentence
}

pub fn fake_avatar_url() -> String {
    format!("https://{}/avatars/{}.png", pick(DOMAINS), random_range(1, 10_000))
}
