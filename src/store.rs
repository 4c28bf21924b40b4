use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Accession, ImagePaneKey, ImageType, JNumber, ResultKey};
use crate::error::GxdError;

/// Read side of the relational store.
///
/// Every method is one query against the backing database. Joins live behind
/// this boundary; callers only see keys.
pub trait ImageStore {
    /// Object key of the accession for the given MGI type.
    fn object_key(&self, accession: &Accession, mgi_type: &str) -> Result<Option<i64>, GxdError>;

    fn image_pane_key(&self, image_key: i64) -> Result<Option<ImagePaneKey>, GxdError>;

    fn reference_key(&self, jnumber: &JNumber) -> Result<Option<i64>, GxdError>;

    fn user_key(&self, login: &str) -> Result<Option<i64>, GxdError>;

    fn probe_key(&self, name: &str) -> Result<Option<i64>, GxdError>;

    /// Number of distinct probes used to assay the marker.
    fn marker_probe_count(&self, marker_id: &str) -> Result<usize, GxdError>;

    /// Figure label and pane key of every image of the reference.
    fn figure_label_panes(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<(String, ImagePaneKey)>, GxdError>;

    fn images_for_reference(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<ImageRow>, GxdError>;

    /// In-situ results of the specimens with this label in the assay.
    fn specimen_result_keys(
        &self,
        assay_id: &str,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError>;

    /// In-situ results of the reference's assays probed with `probe_key`.
    fn probe_result_keys(
        &self,
        reference_key: i64,
        probe_key: i64,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError>;

    fn next_accession_key(&self) -> Result<i64, GxdError>;

    fn next_image_key(&self) -> Result<i64, GxdError>;

    fn next_image_pane_key(&self) -> Result<i64, GxdError>;

    /// Next numeric part for accession IDs with this prefix, from the
    /// accession maximum table. `None` when the prefix has no row.
    fn next_accession_number(&self, prefix: &str) -> Result<Option<i64>, GxdError>;
}

impl<T: ImageStore + ?Sized> ImageStore for &T {
    fn object_key(&self, accession: &Accession, mgi_type: &str) -> Result<Option<i64>, GxdError> {
        (**self).object_key(accession, mgi_type)
    }

    fn image_pane_key(&self, image_key: i64) -> Result<Option<ImagePaneKey>, GxdError> {
        (**self).image_pane_key(image_key)
    }

    fn reference_key(&self, jnumber: &JNumber) -> Result<Option<i64>, GxdError> {
        (**self).reference_key(jnumber)
    }

    fn user_key(&self, login: &str) -> Result<Option<i64>, GxdError> {
        (**self).user_key(login)
    }

    fn probe_key(&self, name: &str) -> Result<Option<i64>, GxdError> {
        (**self).probe_key(name)
    }

    fn marker_probe_count(&self, marker_id: &str) -> Result<usize, GxdError> {
        (**self).marker_probe_count(marker_id)
    }

    fn figure_label_panes(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<(String, ImagePaneKey)>, GxdError> {
        (**self).figure_label_panes(reference_key, image_type)
    }

    fn images_for_reference(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<ImageRow>, GxdError> {
        (**self).images_for_reference(reference_key, image_type)
    }

    fn specimen_result_keys(
        &self,
        assay_id: &str,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        (**self).specimen_result_keys(assay_id, specimen_label)
    }

    fn probe_result_keys(
        &self,
        reference_key: i64,
        probe_key: i64,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        (**self).probe_result_keys(reference_key, probe_key, specimen_label)
    }

    fn next_accession_key(&self) -> Result<i64, GxdError> {
        (**self).next_accession_key()
    }

    fn next_image_key(&self) -> Result<i64, GxdError> {
        (**self).next_image_key()
    }

    fn next_image_pane_key(&self) -> Result<i64, GxdError> {
        (**self).next_image_pane_key()
    }

    fn next_accession_number(&self, prefix: &str) -> Result<Option<i64>, GxdError> {
        (**self).next_accession_number(prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRow {
    pub image_key: i64,
    pub figure_label: String,
    pub creation_date: Option<NaiveDate>,
}

/// JSON export of the tables the loads read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub accessions: Vec<AccessionEntry>,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub image_panes: Vec<ImagePaneEntry>,
    #[serde(default)]
    pub references: Vec<ReferenceEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub probes: Vec<ProbeEntry>,
    #[serde(default)]
    pub assays: Vec<AssayEntry>,
    #[serde(default)]
    pub specimens: Vec<SpecimenEntry>,
    #[serde(default)]
    pub results: Vec<ResultEntry>,
    #[serde(default)]
    pub accession_max: Vec<AccessionMaxEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessionEntry {
    pub acc_id: String,
    pub mgi_type: String,
    pub object_key: i64,
    #[serde(default)]
    pub accession_key: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    pub image_key: i64,
    pub reference_key: i64,
    pub image_type: ImageType,
    pub figure_label: String,
    #[serde(default)]
    pub creation_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePaneEntry {
    pub image_pane_key: i64,
    pub image_key: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub jnumber: String,
    pub reference_key: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub login: String,
    pub user_key: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEntry {
    pub name: String,
    pub probe_key: i64,
    #[serde(default)]
    pub marker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssayEntry {
    pub assay_id: String,
    pub assay_key: i64,
    pub reference_key: i64,
    #[serde(default)]
    pub probe_key: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecimenEntry {
    pub specimen_key: i64,
    pub assay_key: i64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    pub result_key: i64,
    pub specimen_key: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessionMaxEntry {
    pub prefix_part: String,
    pub max_numeric_part: i64,
}

/// [`ImageStore`] over a [`Snapshot`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshot: Snapshot,
    accession_index: HashMap<(String, String), i64>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        let accession_index = snapshot
            .accessions
            .iter()
            .map(|entry| {
                (
                    (entry.acc_id.clone(), entry.mgi_type.clone()),
                    entry.object_key,
                )
            })
            .collect();
        Self {
            snapshot,
            accession_index,
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, GxdError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| GxdError::StoreRead(format!("{path}: {err}")))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|err| GxdError::StoreParse(format!("{path}: {err}")))?;
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn result_keys_for_assays(
        &self,
        assay_keys: &[i64],
        specimen_label: &str,
    ) -> Vec<ResultKey> {
        let specimen_keys = self
            .snapshot
            .specimens
            .iter()
            .filter(|s| assay_keys.contains(&s.assay_key) && s.label == specimen_label)
            .map(|s| s.specimen_key)
            .collect::<Vec<_>>();
        self.snapshot
            .results
            .iter()
            .filter(|r| specimen_keys.contains(&r.specimen_key))
            .map(|r| ResultKey(r.result_key))
            .collect()
    }
}

impl ImageStore for SnapshotStore {
    fn object_key(&self, accession: &Accession, mgi_type: &str) -> Result<Option<i64>, GxdError> {
        Ok(self
            .accession_index
            .get(&(accession.as_str().to_string(), mgi_type.to_string()))
            .copied())
    }

    fn image_pane_key(&self, image_key: i64) -> Result<Option<ImagePaneKey>, GxdError> {
        Ok(self
            .snapshot
            .image_panes
            .iter()
            .find(|pane| pane.image_key == image_key)
            .map(|pane| ImagePaneKey(pane.image_pane_key)))
    }

    fn reference_key(&self, jnumber: &JNumber) -> Result<Option<i64>, GxdError> {
        Ok(self
            .snapshot
            .references
            .iter()
            .find(|r| r.jnumber == jnumber.as_str())
            .map(|r| r.reference_key))
    }

    fn user_key(&self, login: &str) -> Result<Option<i64>, GxdError> {
        Ok(self
            .snapshot
            .users
            .iter()
            .find(|u| u.login == login)
            .map(|u| u.user_key))
    }

    fn probe_key(&self, name: &str) -> Result<Option<i64>, GxdError> {
        Ok(self
            .snapshot
            .probes
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.probe_key))
    }

    fn marker_probe_count(&self, marker_id: &str) -> Result<usize, GxdError> {
        let mut keys = self
            .snapshot
            .probes
            .iter()
            .filter(|p| p.marker_id.as_deref() == Some(marker_id))
            .map(|p| p.probe_key)
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys.dedup();
        Ok(keys.len())
    }

    fn figure_label_panes(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<(String, ImagePaneKey)>, GxdError> {
        let mut rows = Vec::new();
        for image in self
            .snapshot
            .images
            .iter()
            .filter(|i| i.reference_key == reference_key && i.image_type == image_type)
        {
            for pane in self
                .snapshot
                .image_panes
                .iter()
                .filter(|p| p.image_key == image.image_key)
            {
                rows.push((image.figure_label.clone(), ImagePaneKey(pane.image_pane_key)));
            }
        }
        Ok(rows)
    }

    fn images_for_reference(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<ImageRow>, GxdError> {
        Ok(self
            .snapshot
            .images
            .iter()
            .filter(|i| i.reference_key == reference_key && i.image_type == image_type)
            .map(|i| ImageRow {
                image_key: i.image_key,
                figure_label: i.figure_label.clone(),
                creation_date: i.creation_date,
            })
            .collect())
    }

    fn specimen_result_keys(
        &self,
        assay_id: &str,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        let assay_keys = self
            .snapshot
            .assays
            .iter()
            .filter(|a| a.assay_id == assay_id)
            .map(|a| a.assay_key)
            .collect::<Vec<_>>();
        Ok(self.result_keys_for_assays(&assay_keys, specimen_label))
    }

    fn probe_result_keys(
        &self,
        reference_key: i64,
        probe_key: i64,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        let assay_keys = self
            .snapshot
            .assays
            .iter()
            .filter(|a| a.reference_key == reference_key && a.probe_key == Some(probe_key))
            .map(|a| a.assay_key)
            .collect::<Vec<_>>();
        Ok(self.result_keys_for_assays(&assay_keys, specimen_label))
    }

    fn next_accession_key(&self) -> Result<i64, GxdError> {
        let max = self
            .snapshot
            .accessions
            .iter()
            .filter_map(|a| a.accession_key)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    fn next_image_key(&self) -> Result<i64, GxdError> {
        let max = self.snapshot.images.iter().map(|i| i.image_key).max();
        Ok(max.unwrap_or(0) + 1)
    }

    fn next_image_pane_key(&self) -> Result<i64, GxdError> {
        let max = self
            .snapshot
            .image_panes
            .iter()
            .map(|p| p.image_pane_key)
            .max();
        Ok(max.unwrap_or(0) + 1)
    }

    fn next_accession_number(&self, prefix: &str) -> Result<Option<i64>, GxdError> {
        Ok(self
            .snapshot
            .accession_max
            .iter()
            .find(|m| m.prefix_part == prefix)
            .map(|m| m.max_numeric_part + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SnapshotStore {
        let json = r#"{
            "accessions": [
                {"acc_id": "PIX:001", "mgi_type": "Image", "object_key": 10, "accession_key": 500}
            ],
            "images": [
                {"image_key": 10, "reference_key": 7, "image_type": "Full Size", "figure_label": "Fig3A"}
            ],
            "image_panes": [{"image_pane_key": 42, "image_key": 10}],
            "probes": [
                {"name": "MTF#1", "probe_key": 1, "marker_id": "MGI:1"},
                {"name": "MTF#2", "probe_key": 2, "marker_id": "MGI:1"},
                {"name": "MTF#3", "probe_key": 3, "marker_id": "MGI:2"}
            ],
            "assays": [{"assay_id": "MGI:900", "assay_key": 1, "reference_key": 7, "probe_key": 1}],
            "specimens": [
                {"specimen_key": 11, "assay_key": 1, "label": "A"},
                {"specimen_key": 12, "assay_key": 1, "label": "B"}
            ],
            "results": [
                {"result_key": 5001, "specimen_key": 11},
                {"result_key": 5002, "specimen_key": 11},
                {"result_key": 5003, "specimen_key": 12}
            ],
            "accession_max": [{"prefix_part": "MGI:", "max_numeric_part": 4000}]
        }"#;
        SnapshotStore::new(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn accession_lookup_is_type_scoped() {
        let store = sample();
        let acc = Accession::new("PIX:001");
        assert_eq!(store.object_key(&acc, "Image").unwrap(), Some(10));
        assert_eq!(store.object_key(&acc, "Marker").unwrap(), None);
    }

    #[test]
    fn specimen_join_fans_out() {
        let store = sample();
        let keys = store.specimen_result_keys("MGI:900", "A").unwrap();
        assert_eq!(keys, vec![ResultKey(5001), ResultKey(5002)]);
        let by_probe = store.probe_result_keys(7, 1, "B").unwrap();
        assert_eq!(by_probe, vec![ResultKey(5003)]);
    }

    #[test]
    fn probe_counts_and_next_key() {
        let store = sample();
        assert_eq!(store.marker_probe_count("MGI:1").unwrap(), 2);
        assert_eq!(store.marker_probe_count("MGI:3").unwrap(), 0);
        assert_eq!(store.next_accession_key().unwrap(), 501);
    }

    #[test]
    fn next_keys_follow_table_maximums() {
        let store = sample();
        assert_eq!(store.next_image_key().unwrap(), 11);
        assert_eq!(store.next_image_pane_key().unwrap(), 43);
        assert_eq!(store.next_accession_number("MGI:").unwrap(), Some(4001));
        assert_eq!(store.next_accession_number("J:").unwrap(), None);

        let empty = SnapshotStore::default();
        assert_eq!(empty.next_image_key().unwrap(), 1);
        assert_eq!(empty.next_image_pane_key().unwrap(), 1);
    }
}
