//! Prediction result types for Clipscope

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Prompts paired with probabilities, ranked by descending probability
///
/// Serializes as a JSON object whose key order is the ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedScores {
    entries: Vec<(String, f32)>,
}

impl RankedScores {
    /// Pair prompts with their probabilities and rank them
    ///
    /// A prompt that appears more than once keeps the position of its first
    /// occurrence and the probability of its last. Ties in probability keep
    /// prompt order.
    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut entries: Vec<(String, f32)> = Vec::new();
        for (prompt, probability) in scores {
            let prompt = prompt.into();
            match entries.iter_mut().find(|(existing, _)| *existing == prompt) {
                Some(entry) => entry.1 = probability,
                None => entries.push((prompt, probability)),
            }
        }

        // sort_by is stable
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));

        Self { entries }
    }

    /// Ranked `(prompt, probability)` pairs
    pub fn entries(&self) -> &[(String, f32)] {
        &self.entries
    }

    /// Probability for a prompt, if scored
    pub fn get(&self, prompt: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(p, _)| p == prompt)
            .map(|(_, probability)| *probability)
    }

    /// Highest-ranked prompt
    pub fn top(&self) -> Option<(&str, f32)> {
        self.entries.first().map(|(p, s)| (p.as_str(), *s))
    }

    /// Sum of all probabilities
    pub fn total(&self) -> f32 {
        self.entries.iter().map(|(_, s)| s).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RankedScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (prompt, probability) in &self.entries {
            map.serialize_entry(prompt, probability)?;
        }
        map.end()
    }
}

/// Per-model ranked scores keyed by model display name
///
/// Keeps insertion order; inserting an existing name replaces its scores in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPredictions {
    models: Vec<(String, RankedScores)>,
}

impl ModelPredictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scores for one model
    pub fn insert(&mut self, name: impl Into<String>, scores: RankedScores) {
        let name = name.into();
        match self.models.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = scores,
            None => self.models.push((name, scores)),
        }
    }

    /// Scores for a model by display name
    pub fn get(&self, name: &str) -> Option<&RankedScores> {
        self.models
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, scores)| scores)
    }

    /// Model display names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RankedScores)> {
        self.models.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Serialize for ModelPredictions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.models.len()))?;
        for (name, scores) in &self.models {
            map.serialize_entry(name, scores)?;
        }
        map.end()
    }
}
