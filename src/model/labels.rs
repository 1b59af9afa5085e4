//! Mapping between class indices and gesture labels.

use crate::model::TrainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Sorted unique labels; a label's position is its class index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    classes: Vec<String>,
}

/// On-disk form of the label map.
#[derive(Debug, Serialize, Deserialize)]
struct LabelMapFile {
    index_to_class: BTreeMap<String, String>,
    classes: Vec<String>,
}

impl LabelMap {
    /// Build from any label sequence. Duplicates collapse, order is sorted.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|s| s.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Encode labels as class indices.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, TrainError> {
        labels
            .iter()
            .map(|l| {
                self.index_of(l.as_ref())
                    .ok_or_else(|| TrainError::UnknownLabel(l.as_ref().to_string()))
            })
            .collect()
    }

    /// Write `label_map.json`.
    pub fn save(&self, path: &Path) -> Result<(), TrainError> {
        let file = LabelMapFile {
            index_to_class: self
                .classes
                .iter()
                .enumerate()
                .map(|(i, c)| (i.to_string(), c.clone()))
                .collect(),
            classes: self.classes.clone(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Read `label_map.json`. The index map is authoritative.
    pub fn load(path: &Path) -> Result<Self, TrainError> {
        let content = std::fs::read_to_string(path)?;
        let file: LabelMapFile = serde_json::from_str(&content)?;

        let mut classes = vec![String::new(); file.index_to_class.len()];
        for (key, class) in file.index_to_class {
            let index: usize = key
                .parse()
                .map_err(|_| TrainError::InvalidLabelMap(format!("bad index {key:?}")))?;
            let slot = classes
                .get_mut(index)
                .ok_or_else(|| TrainError::InvalidLabelMap(format!("index {index} out of range")))?;
            *slot = class;
        }

        let map = Self::from_labels(&classes);
        if map.classes != classes {
            return Err(TrainError::InvalidLabelMap(
                "classes are not unique and sorted".into(),
            ));
        }
        Ok(map)
    }
}
