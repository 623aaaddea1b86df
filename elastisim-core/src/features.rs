// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Request feature records and the keyword-based request analyzer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse workload class of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Simple,
    Complex,
    Code,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Simple, Category::Complex, Category::Code];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Complex => "complex",
            Self::Code => "code",
        }
    }

    /// One-hot encoding in `[simple, complex, code]` order.
    pub fn one_hot(&self) -> [f64; 3] {
        match self {
            Self::Simple => [1.0, 0.0, 0.0],
            Self::Complex => [0.0, 1.0, 0.0],
            Self::Code => [0.0, 0.0, 1.0],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Accepts the English names and the labels used by older training data.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "complex" | "compleja" => Ok(Self::Complex),
            "code" | "codigo" | "código" => Ok(Self::Code),
            other => Err(format!("unknown request category '{}'", other)),
        }
    }
}

/// Structured features of one request.
///
/// `embedding` is optional; predictors substitute a zero vector of their
/// declared width when it is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub length: usize,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
}

impl FeatureRecord {
    pub fn new(length: usize, category: Category) -> Self {
        Self {
            length,
            category,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Flatten into `[length, one-hot(category), embedding...]`.
    ///
    /// A missing embedding is padded with `embedding_width` zeros; a present
    /// one is copied as-is so width mismatches stay visible to the caller.
    pub fn to_vector(&self, embedding_width: usize) -> Vec<f64> {
        let embedding_len = self.embedding.as_ref().map_or(embedding_width, Vec::len);
        let mut vector = Vec::with_capacity(4 + embedding_len);
        vector.push(self.length as f64);
        vector.extend_from_slice(&self.category.one_hot());
        match &self.embedding {
            Some(embedding) => vector.extend_from_slice(embedding),
            None => vector.resize(4 + embedding_width, 0.0),
        }
        vector
    }
}

const CODE_KEYWORDS: &[&str] = &["code", "execute", "script", "código", "codigo", "ejecutar"];
const COMPLEX_KEYWORDS: &[&str] = &[
    "analysis",
    "analyze",
    "prediction",
    "predict",
    "análisis",
    "analisis",
    "predicción",
    "prediccion",
];

/// Extracts [`FeatureRecord`]s from raw request text.
///
/// Length is the character count; the category comes from keyword matches,
/// code taking precedence over complex.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAnalyzer;

impl RequestAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> FeatureRecord {
        let lowered = text.to_lowercase();
        let category = if CODE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Category::Code
        } else if COMPLEX_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Category::Complex
        } else {
            Category::Simple
        };

        FeatureRecord::new(text.chars().count(), category)
    }
}
