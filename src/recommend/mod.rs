use crate::engine::challenge::RandomSource;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const FALLBACK_RECOMMENDATION: &str =
    "No tailored recommendation found. Try relaxing or doing a short activity.";
pub const ENERGY_MIN: u8 = 1;
pub const ENERGY_MAX: u8 = 5;

const DEFAULT_CATALOG: &str = include_str!("../../assets/recommendations.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodLabel {
    Happy,
    Calm,
    Tired,
    Stressed,
    Sad,
    Anxious,
}

impl MoodLabel {
    pub const ALL: [MoodLabel; 6] = [
        MoodLabel::Happy,
        MoodLabel::Calm,
        MoodLabel::Tired,
        MoodLabel::Stressed,
        MoodLabel::Sad,
        MoodLabel::Anxious,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MoodLabel::Happy => "happy",
            MoodLabel::Calm => "calm",
            MoodLabel::Tired => "tired",
            MoodLabel::Stressed => "stressed",
            MoodLabel::Sad => "sad",
            MoodLabel::Anxious => "anxious",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == normalized)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub mood: MoodLabel,
    pub energy_min: u8,
    pub energy_max: u8,
    pub text: String,
}

impl Recommendation {
    fn fits(&self, mood: MoodLabel, energy: u8) -> bool {
        self.mood == mood && self.energy_min <= energy && energy <= self.energy_max
    }
}

/// What the student sees after a check-in. `id` is absent for the fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub id: Option<i64>,
    pub text: String,
}

impl Suggestion {
    fn fallback() -> Self {
        Self {
            id: None,
            text: FALLBACK_RECOMMENDATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub recommendations: Vec<Recommendation>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recommendation catalog: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse recommendation catalog: {}", path.display()))
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_CATALOG).context("Built-in recommendation catalog is invalid")
    }

    /// Catalog file when readable, otherwise the built-in one.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(catalog) => Ok(catalog),
            Err(error) => {
                warn!(error = %error, "falling back to built-in recommendation catalog");
                Self::builtin()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn get(&self, id: i64) -> Option<&Recommendation> {
        self.recommendations.iter().find(|entry| entry.id == id)
    }

    pub fn matching(&self, mood: MoodLabel, energy: u8) -> Vec<&Recommendation> {
        self.recommendations
            .iter()
            .filter(|entry| entry.fits(mood, energy))
            .collect()
    }

    /// Uniform pick among matching entries, skipping `exclude` when another match exists.
    pub fn suggest(
        &self,
        mood: MoodLabel,
        energy: u8,
        exclude: Option<i64>,
        random: &mut impl RandomSource,
    ) -> Suggestion {
        let matches = self.matching(mood, energy);
        let others = matches
            .iter()
            .copied()
            .filter(|entry| Some(entry.id) != exclude)
            .collect::<Vec<_>>();
        let pool = if others.is_empty() { matches } else { others };

        if pool.is_empty() {
            return Suggestion::fallback();
        }

        let picked = pool[random.pick(pool.len()) % pool.len()];
        Suggestion {
            id: Some(picked.id),
            text: picked.text.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.recommendations {
            if !seen.insert(entry.id) {
                bail!("duplicate recommendation id {}", entry.id);
            }
            if entry.energy_min > entry.energy_max
                || entry.energy_min < ENERGY_MIN
                || entry.energy_max > ENERGY_MAX
            {
                bail!(
                    "recommendation {} has invalid energy range {}-{}",
                    entry.id,
                    entry.energy_min,
                    entry.energy_max
                );
            }
            if entry.text.trim().is_empty() {
                bail!("recommendation {} has empty text", entry.id);
            }
        }
        Ok(())
    }
}

pub fn validate_energy(energy: u8) -> Result<u8> {
    if !(ENERGY_MIN..=ENERGY_MAX).contains(&energy) {
        bail!("energy must be between {ENERGY_MIN} and {ENERGY_MAX}, got {energy}");
    }
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use super::{Catalog, FALLBACK_RECOMMENDATION, MoodLabel, validate_energy};
    use crate::engine::challenge::RandomSource;

    struct FixedIndex(usize);

    impl RandomSource for FixedIndex {
        fn pick(&mut self, _len: usize) -> usize {
            self.0
        }
    }

    fn catalog() -> Catalog {
        Catalog::parse(
            r#"{"recommendations":[
                {"id":1,"mood":"tired","energy_min":1,"energy_max":2,"text":"nap"},
                {"id":2,"mood":"tired","energy_min":1,"energy_max":3,"text":"water"},
                {"id":3,"mood":"happy","energy_min":3,"energy_max":5,"text":"study"}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn builtin_catalog_covers_every_mood() {
        let catalog = Catalog::builtin().unwrap();
        for mood in MoodLabel::ALL {
            assert!(
                (1..=5).any(|energy| !catalog.matching(mood, energy).is_empty()),
                "no entry for {}",
                mood.as_str()
            );
        }
    }

    #[test]
    fn suggestion_respects_mood_and_energy_range() {
        let catalog = catalog();

        let low = catalog.suggest(MoodLabel::Tired, 1, None, &mut FixedIndex(0));
        assert_eq!(low.id, Some(1));

        let mid = catalog.suggest(MoodLabel::Tired, 3, None, &mut FixedIndex(0));
        assert_eq!(mid.id, Some(2));
    }

    #[test]
    fn try_another_skips_current_unless_it_is_the_only_match() {
        let catalog = catalog();

        let other = catalog.suggest(MoodLabel::Tired, 2, Some(1), &mut FixedIndex(0));
        assert_eq!(other.id, Some(2));

        let only = catalog.suggest(MoodLabel::Happy, 4, Some(3), &mut FixedIndex(0));
        assert_eq!(only.id, Some(3));
    }

    #[test]
    fn no_match_returns_fallback_text() {
        let suggestion = catalog().suggest(MoodLabel::Sad, 3, None, &mut FixedIndex(0));
        assert_eq!(suggestion.id, None);
        assert_eq!(suggestion.text, FALLBACK_RECOMMENDATION);
    }

    #[test]
    fn rejects_bad_catalogs_and_energy() {
        assert!(Catalog::parse(r#"{"recommendations":[{"id":1,"mood":"calm","energy_min":4,"energy_max":2,"text":"x"}]}"#).is_err());
        assert!(Catalog::parse(r#"{"recommendations":[{"id":1,"mood":"bored","energy_min":1,"energy_max":2,"text":"x"}]}"#).is_err());
        assert!(validate_energy(0).is_err());
        assert!(validate_energy(6).is_err());
        assert_eq!(validate_energy(5).unwrap(), 5);
        assert_eq!(MoodLabel::parse(" Calm "), Some(MoodLabel::Calm));
    }
}
