//! Random passwords for new principals

use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng,
};

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const PUNCTUATION: &[u8] = b"?.!$%^*()-_+=~";

/// Default password length
pub const DEFAULT_LENGTH: usize = 18;

/// Generates random passwords with a minimum number of characters from each class
///
/// ```
/// use kerberos_ops::SecurePasswordGenerator;
///
/// let password = SecurePasswordGenerator::new()
///     .length(24)
///     .min_digits(4)
///     .generate();
/// assert_eq!(password.len(), 24);
/// assert!(password.chars().filter(char::is_ascii_digit).count() >= 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurePasswordGenerator {
    length: usize,
    min_lowercase: usize,
    min_uppercase: usize,
    min_digits: usize,
    min_punctuation: usize,
}

impl Default for SecurePasswordGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            min_lowercase: 1,
            min_uppercase: 1,
            min_digits: 1,
            min_punctuation: 1,
        }
    }
}

impl SecurePasswordGenerator {
    /// Generator for [`DEFAULT_LENGTH`] passwords with at least one character of each class
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the password length
    ///
    /// Raised to the sum of the per-class minimums if lower.
    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Set the minimum number of lowercase letters
    pub fn min_lowercase(mut self, count: usize) -> Self {
        self.min_lowercase = count;
        self
    }

    /// Set the minimum number of uppercase letters
    pub fn min_uppercase(mut self, count: usize) -> Self {
        self.min_uppercase = count;
        self
    }

    /// Set the minimum number of digits
    pub fn min_digits(mut self, count: usize) -> Self {
        self.min_digits = count;
        self
    }

    /// Set the minimum number of punctuation characters
    pub fn min_punctuation(mut self, count: usize) -> Self {
        self.min_punctuation = count;
        self
    }

    /// Generate a password with the thread-local random generator
    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::rng())
    }

    /// Generate a password with `rng`
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let classes = [
            (LOWERCASE, self.min_lowercase),
            (UPPERCASE, self.min_uppercase),
            (DIGITS, self.min_digits),
            (PUNCTUATION, self.min_punctuation),
        ];
        let required: usize = classes.iter().map(|(_, min)| min).sum();
        let alphabet: Vec<u8> = classes.iter().flat_map(|(set, _)| set.iter().copied()).collect();

        let mut password = Vec::with_capacity(self.length.max(required));
        for (set, min) in classes {
            password.extend(set.choose_multiple(rng, min).copied());
            // choose_multiple never repeats, top up for minimums above the class size
            while password.iter().filter(|c| set.contains(*c)).count() < min {
                password.extend(set.choose(rng).copied());
            }
        }
        while password.len() < self.length {
            password.extend(alphabet.choose(rng).copied());
        }
        password.shuffle(rng);

        password.into_iter().map(char::from).collect()
    }
}
