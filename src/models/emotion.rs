use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// Emotion axis labels in their declared priority order
///
/// `None` is the sentinel returned by [`EmotionVector::dominant`] for an
/// all-zero vector. It is never an axis of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Disgust,
    None,
}

impl EmotionLabel {
    /// The five axes, in tie-break order
    pub const AXES: [EmotionLabel; 5] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "JOY",
            EmotionLabel::Sadness => "SADNESS",
            EmotionLabel::Anger => "ANGER",
            EmotionLabel::Fear => "FEAR",
            EmotionLabel::Disgust => "DISGUST",
            EmotionLabel::None => "NONE",
        }
    }

    /// Parses the persisted form written by [`EmotionLabel::as_str`]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "JOY" => Some(EmotionLabel::Joy),
            "SADNESS" => Some(EmotionLabel::Sadness),
            "ANGER" => Some(EmotionLabel::Anger),
            "FEAR" => Some(EmotionLabel::Fear),
            "DISGUST" => Some(EmotionLabel::Disgust),
            "NONE" => Some(EmotionLabel::None),
            _ => None,
        }
    }
}

impl Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Five-component emotion score over the [`EmotionLabel::AXES`]
///
/// Components are non-negative but need not sum to one; use
/// [`EmotionVector::normalize`] for the proportional view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionVector {
    pub joy: f64,
    pub sadness: f64,
    pub anger: f64,
    pub fear: f64,
    pub disgust: f64,
}

impl EmotionVector {
    pub const fn zero() -> Self {
        Self {
            joy: 0.0,
            sadness: 0.0,
            anger: 0.0,
            fear: 0.0,
            disgust: 0.0,
        }
    }

    /// Builds a vector from components laid out in [`EmotionLabel::AXES`] order
    pub const fn from_components(c: [f64; 5]) -> Self {
        Self {
            joy: c[0],
            sadness: c[1],
            anger: c[2],
            fear: c[3],
            disgust: c[4],
        }
    }

    /// Builds a vector, rejecting negative or non-finite components
    pub fn try_from_components(c: [f64; 5]) -> AppResult<Self> {
        for (label, value) in EmotionLabel::AXES.iter().zip(c) {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::InvalidVector(format!(
                    "{} must be a non-negative number, got {}",
                    label, value
                )));
            }
        }
        Ok(Self::from_components(c))
    }

    pub const fn components(&self) -> [f64; 5] {
        [self.joy, self.sadness, self.anger, self.fear, self.disgust]
    }

    /// Component for one axis; the `None` sentinel has no component and reads as 0
    pub fn get(&self, label: EmotionLabel) -> f64 {
        match label {
            EmotionLabel::Joy => self.joy,
            EmotionLabel::Sadness => self.sadness,
            EmotionLabel::Anger => self.anger,
            EmotionLabel::Fear => self.fear,
            EmotionLabel::Disgust => self.disgust,
            EmotionLabel::None => 0.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.components().iter().sum()
    }

    pub fn scale(&self, k: f64) -> Self {
        Self::from_components(self.components().map(|c| c * k))
    }

    fn dot(&self, other: &Self) -> f64 {
        self.components()
            .iter()
            .zip(other.components())
            .map(|(a, b)| a * b)
            .sum()
    }

    fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Divides each component by the component sum
    ///
    /// A vector whose sum is not positive normalizes to the zero vector.
    pub fn normalize(&self) -> Self {
        let total = self.sum();
        if total > 0.0 {
            Self::from_components(self.components().map(|c| c / total))
        } else {
            Self::zero()
        }
    }

    /// Label of the largest component
    ///
    /// Ties resolve to the earliest label in [`EmotionLabel::AXES`]; an
    /// all-zero vector yields [`EmotionLabel::None`].
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::None;
        let mut best_value = 0.0;
        for label in EmotionLabel::AXES {
            let value = self.get(label);
            // strict comparison keeps the first maximal label
            if value > best_value {
                best = label;
                best_value = value;
            }
        }
        best
    }

    /// Cosine of the angle between two vectors, 0.0 when either is zero
    pub fn cosine_similarity(&self, other: &Self) -> f64 {
        let norm_a = self.norm();
        let norm_b = other.norm();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (self.dot(other) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }

    /// Component-wise arithmetic mean, zero vector for an empty set
    ///
    /// Components are accumulated in iteration order, so callers that need
    /// reproducible bits must supply samples in a stable order.
    pub fn mean<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a EmotionVector>,
    {
        let mut totals = [0.0_f64; 5];
        let mut count = 0_usize;

        for sample in samples {
            for (total, c) in totals.iter_mut().zip(sample.components()) {
                *total += c;
            }
            count += 1;
        }

        if count == 0 {
            return Self::zero();
        }

        let n = count as f64;
        Self::from_components(totals.map(|t| t / n))
    }
}

/// Emotion scores as submitted by clients
///
/// Every field is optional on the wire so a missing label can be reported
/// as an invalid vector instead of a generic body rejection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmotionScores {
    pub joy: Option<f64>,
    pub sadness: Option<f64>,
    pub anger: Option<f64>,
    pub fear: Option<f64>,
    pub disgust: Option<f64>,
}

impl From<EmotionVector> for EmotionScores {
    fn from(v: EmotionVector) -> Self {
        Self {
            joy: Some(v.joy),
            sadness: Some(v.sadness),
            anger: Some(v.anger),
            fear: Some(v.fear),
            disgust: Some(v.disgust),
        }
    }
}

impl TryFrom<EmotionScores> for EmotionVector {
    type Error = AppError;

    /// Boundary validation: all five labels present, each within `[0, 1]`
    fn try_from(scores: EmotionScores) -> Result<Self, Self::Error> {
        let fields = [
            scores.joy,
            scores.sadness,
            scores.anger,
            scores.fear,
            scores.disgust,
        ];

        let mut components = [0.0_f64; 5];
        for ((slot, label), field) in components.iter_mut().zip(EmotionLabel::AXES).zip(fields) {
            let value = field.ok_or_else(|| {
                AppError::InvalidVector(format!("missing emotion label {}", label))
            })?;
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::InvalidVector(format!(
                    "{} must be within [0, 1], got {}",
                    label, value
                )));
            }
            *slot = value;
        }

        Ok(EmotionVector::from_components(components))
    }
}
