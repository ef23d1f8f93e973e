//! Local lexicon-based sentiment scoring.
//!
//! A small valence lexicon with negation and intensity handling,
//! producing a compound score in [-1, +1] via the usual
//! `x / sqrt(x^2 + alpha)` normalisation. Scoring is pure and cheap,
//! so it runs inline in the ingestion path with no remote calls.

use chorus_core::enrich::SentimentScorer;

/// Normalisation constant: the expected maximum raw valence sum.
const ALPHA: f64 = 15.0;

/// Valence multiplier applied when a negator precedes a scored word.
const NEGATION_FACTOR: f64 = -0.74;

/// Valence added (sign-matched) per booster preceding a scored word.
const BOOSTER_STEP: f64 = 0.293;

/// How many preceding tokens are scanned for negators and boosters.
const LOOKBACK: usize = 3;

/// Word valences on the [-4, +4] scale.
static LEXICON: &[(&str, f64)] = &[
    ("abysmal", -3.1),
    ("amazing", 2.8),
    ("angry", -2.3),
    ("annoying", -1.9),
    ("awesome", 3.1),
    ("awful", -2.9),
    ("bad", -2.5),
    ("beautiful", 2.9),
    ("best", 3.2),
    ("boring", -1.6),
    ("brilliant", 2.8),
    ("broken", -1.8),
    ("buggy", -1.9),
    ("calm", 1.3),
    ("cool", 1.7),
    ("crap", -2.5),
    ("dead", -2.6),
    ("delightful", 2.6),
    ("disappointing", -2.2),
    ("disaster", -3.1),
    ("disgusting", -3.0),
    ("dreadful", -2.8),
    ("dumb", -2.2),
    ("easy", 1.6),
    ("elegant", 2.1),
    ("enjoy", 2.0),
    ("excellent", 3.0),
    ("excited", 2.2),
    ("fail", -2.3),
    ("failure", -2.5),
    ("fantastic", 2.9),
    ("fast", 1.4),
    ("fine", 1.0),
    ("fun", 2.3),
    ("garbage", -2.7),
    ("glad", 2.0),
    ("good", 1.9),
    ("great", 2.8),
    ("happy", 2.7),
    ("hate", -2.7),
    ("helpful", 1.8),
    ("horrible", -2.9),
    ("hype", 1.5),
    ("impressive", 2.4),
    ("incredible", 2.9),
    ("interesting", 1.7),
    ("joy", 2.8),
    ("lame", -1.8),
    ("like", 1.5),
    ("love", 3.0),
    ("lovely", 2.8),
    ("mediocre", -1.2),
    ("mess", -1.9),
    ("nice", 1.8),
    ("nightmare", -2.8),
    ("pain", -2.1),
    ("pathetic", -2.5),
    ("perfect", 3.1),
    ("pleasant", 2.1),
    ("poor", -1.9),
    ("problem", -1.6),
    ("rubbish", -2.3),
    ("sad", -2.1),
    ("scam", -2.8),
    ("slow", -1.2),
    ("smart", 1.9),
    ("smooth", 1.6),
    ("solid", 1.7),
    ("stupid", -2.4),
    ("sucks", -2.4),
    ("terrible", -3.0),
    ("terrific", 2.8),
    ("trash", -2.4),
    ("ugly", -2.2),
    ("unhappy", -2.1),
    ("unreliable", -1.9),
    ("useful", 1.9),
    ("useless", -2.2),
    ("waste", -2.2),
    ("weak", -1.6),
    ("win", 2.4),
    ("wonderful", 2.9),
    ("worst", -3.3),
    ("worthless", -2.7),
    ("wow", 2.1),
    ("wrong", -1.7),
];

static NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "cannot", "without", "hardly", "barely",
];

static BOOSTERS: &[(&str, f64)] = &[
    ("absolutely", BOOSTER_STEP),
    ("completely", BOOSTER_STEP),
    ("extremely", BOOSTER_STEP),
    ("incredibly", BOOSTER_STEP),
    ("really", BOOSTER_STEP),
    ("so", BOOSTER_STEP),
    ("totally", BOOSTER_STEP),
    ("very", BOOSTER_STEP),
    ("barely", -BOOSTER_STEP),
    ("kinda", -BOOSTER_STEP),
    ("slightly", -BOOSTER_STEP),
    ("somewhat", -BOOSTER_STEP),
];

fn valence_of(token: &str) -> Option<f64> {
    LEXICON
        .binary_search_by(|(word, _)| word.cmp(&token))
        .ok()
        .map(|i| LEXICON[i].1)
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token) || token.ends_with("n't")
}

fn booster_of(token: &str) -> Option<f64> {
    BOOSTERS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, v)| *v)
}

fn normalise(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

/// Compound sentiment scorer over the embedded lexicon.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Option<f64> {
        let tokens: Vec<String> = text.split_whitespace().map(normalise).collect();

        let mut sum = 0.0;
        let mut hits = 0u32;

        for (i, token) in tokens.iter().enumerate() {
            let Some(mut valence) = valence_of(token) else {
                continue;
            };
            hits += 1;

            let lookback_from = i.saturating_sub(LOOKBACK);
            for prior in &tokens[lookback_from..i] {
                if let Some(boost) = booster_of(prior) {
                    // Boost pushes away from zero, dampeners pull toward it.
                    valence += if valence >= 0.0 { boost } else { -boost };
                }
                if is_negator(prior) {
                    valence *= NEGATION_FACTOR;
                }
            }

            sum += valence;
        }

        if hits == 0 {
            return None;
        }

        let compound = sum / (sum * sum + ALPHA).sqrt();
        Some(compound.clamp(-1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> Option<f64> {
        LexiconScorer::new().score(text)
    }

    #[test]
    fn lexicon_is_sorted_for_binary_search() {
        assert!(LEXICON.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn positive_and_negative_texts_diverge() {
        let good = score("this release is great, love the new design").unwrap();
        let bad = score("terrible update, everything is broken").unwrap();
        assert!(good > 0.0);
        assert!(bad < 0.0);
    }

    #[test]
    fn unscorable_text_yields_none() {
        assert_eq!(score("the quick brown fox"), None);
        assert_eq!(score(""), None);
    }

    #[test]
    fn negation_flips_polarity() {
        let plain = score("this is good").unwrap();
        let negated = score("this is not good").unwrap();
        assert!(plain > 0.0);
        assert!(negated < 0.0);
    }

    #[test]
    fn booster_amplifies() {
        let plain = score("good").unwrap();
        let boosted = score("really very good").unwrap();
        assert!(boosted > plain);
    }

    #[test]
    fn dampener_attenuates() {
        let plain = score("bad").unwrap();
        let damped = score("slightly bad").unwrap();
        assert!(damped > plain, "less negative than plain");
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert!(score("GREAT!!!").unwrap() > 0.0);
    }

    #[test]
    fn compound_stays_in_range() {
        let piled_on = "best amazing wonderful fantastic excellent perfect \
                        incredible brilliant awesome terrific love";
        let v = score(piled_on).unwrap();
        assert!((-1.0..=1.0).contains(&v));
        assert!(v > 0.9);
    }
}
