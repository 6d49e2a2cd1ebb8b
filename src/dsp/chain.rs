//! Effect chain description
//!
//! A chain is submitted as a JSON list of `{ "name": ..., ...params }`
//! objects and is never modified afterwards. Order is processing order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MoodshiftError, Result};

/// One requested effect: a name plus its raw parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Effect name; empty when the client omitted it
    #[serde(default)]
    pub name: String,
    /// Every other key of the submitted object
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl EffectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style numeric parameter
    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Ordered, immutable list of effects for one job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectChain {
    effects: Vec<EffectSpec>,
}

impl EffectChain {
    pub fn new(effects: Vec<EffectSpec>) -> Self {
        Self { effects }
    }

    /// Parse a submitted chain
    ///
    /// Rejects anything that is not a list of objects. Individual entries
    /// are not validated here; bad parameters only skip that effect later.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| MoodshiftError::InvalidChain {
            reason: format!("invalid JSON: {}", e),
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let entries = match value {
            Value::Array(entries) => entries,
            _ => {
                return Err(MoodshiftError::InvalidChain {
                    reason: "Effects chain must be a list.".to_string(),
                })
            }
        };

        let effects = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                if !entry.is_object() {
                    return Err(MoodshiftError::InvalidChain {
                        reason: format!("effect {} is not an object", i),
                    });
                }
                Ok(serde_json::from_value(entry)?)
            })
            .collect::<Result<Vec<EffectSpec>>>()?;

        Ok(Self { effects })
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectSpec> {
        self.effects.iter()
    }

    pub fn get(&self, index: usize) -> Option<&EffectSpec> {
        self.effects.get(index)
    }
}

impl FromIterator<EffectSpec> for EffectChain {
    fn from_iter<I: IntoIterator<Item = EffectSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
