//! Random password generation and a coarse strength score.

use anyhow::{Result, bail};
use getrandom::fill;
use zeroize::Zeroizing;

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LETTERS_NO_LOOKALIKES: &str = "abcdefghijkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const DIGITS_NO_LOOKALIKES: &str = "23456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: usize,
    pub letters: bool,
    pub digits: bool,
    pub symbols: bool,
    /// Leaves out `l`, `o`, `I`, `O`, `0` and `1`.
    pub exclude_lookalikes: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 12,
            letters: true,
            digits: true,
            symbols: true,
            exclude_lookalikes: true,
        }
    }
}

impl PasswordPolicy {
    fn alphabet(&self) -> Vec<u8> {
        let mut chars = String::new();
        if self.letters {
            chars.push_str(if self.exclude_lookalikes {
                LETTERS_NO_LOOKALIKES
            } else {
                LETTERS
            });
        }
        if self.digits {
            chars.push_str(if self.exclude_lookalikes {
                DIGITS_NO_LOOKALIKES
            } else {
                DIGITS
            });
        }
        if self.symbols {
            chars.push_str(SYMBOLS);
        }
        chars.into_bytes()
    }
}

/// Draws a password uniformly from the policy's alphabet.
pub fn generate(policy: &PasswordPolicy) -> Result<Zeroizing<String>> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&policy.length) {
        bail!("password length must be between {MIN_LENGTH} and {MAX_LENGTH}");
    }
    let alphabet = policy.alphabet();
    if alphabet.is_empty() {
        bail!("at least one character class must be enabled");
    }

    // rejection sampling keeps the distribution uniform
    let limit = 256 - (256 % alphabet.len());
    let mut password = Zeroizing::new(String::with_capacity(policy.length));
    let mut buf = Zeroizing::new([0u8; 64]);

    while password.len() < policy.length {
        fill(buf.as_mut_slice()).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;
        for &b in buf.iter() {
            if (b as usize) < limit {
                password.push(alphabet[b as usize % alphabet.len()] as char);
                if password.len() == policy.length {
                    break;
                }
            }
        }
    }

    Ok(password)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthLabel {
    Weak,
    Fair,
    Good,
    Strong,
}

/// Scores 0..=5: one point each for length >= 8, length >= 12, lowercase,
/// uppercase, digit and symbol, capped at 5.
pub fn strength(password: &str) -> u8 {
    let len = password.chars().count();
    let checks = [
        len >= 8,
        len >= 12,
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
    ];
    let score = checks.iter().filter(|&&passed| passed).count() as u8;
    score.min(5)
}

pub fn strength_label(score: u8) -> StrengthLabel {
    match score {
        0..=2 => StrengthLabel::Weak,
        3 => StrengthLabel::Fair,
        4 => StrengthLabel::Good,
        _ => StrengthLabel::Strong,
    }
}
