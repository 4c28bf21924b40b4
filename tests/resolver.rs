use std::sync::Mutex;

use camino::Utf8Path;
use serde_json::json;

use gxd_imgload::domain::{Accession, ImagePaneKey, ImageType, JNumber, ResultKey};
use gxd_imgload::error::GxdError;
use gxd_imgload::pixel::PixelMapping;
use gxd_imgload::resolver::{Resolution, ResolverCache};
use gxd_imgload::schema::MalformedPolicy;
use gxd_imgload::store::{ImageRow, ImageStore, SnapshotStore};

/// Forwards to a snapshot and records every accession it is asked about.
struct RecordingStore {
    inner: SnapshotStore,
    lookups: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn new() -> Self {
        let snapshot = json!({
            "accessions": [
                {"acc_id": "PIX:001", "mgi_type": "Image", "object_key": 10},
                {"acc_id": "PIX:002", "mgi_type": "Image", "object_key": 20}
            ],
            "image_panes": [
                {"image_pane_key": 42, "image_key": 10},
                {"image_pane_key": 0, "image_key": 20}
            ]
        });
        Self {
            inner: SnapshotStore::new(serde_json::from_value(snapshot).unwrap()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl ImageStore for RecordingStore {
    fn object_key(&self, accession: &Accession, mgi_type: &str) -> Result<Option<i64>, GxdError> {
        self.lookups
            .lock()
            .unwrap()
            .push(accession.as_str().to_string());
        self.inner.object_key(accession, mgi_type)
    }

    fn image_pane_key(&self, image_key: i64) -> Result<Option<ImagePaneKey>, GxdError> {
        self.inner.image_pane_key(image_key)
    }

    fn reference_key(&self, jnumber: &JNumber) -> Result<Option<i64>, GxdError> {
        self.inner.reference_key(jnumber)
    }

    fn user_key(&self, login: &str) -> Result<Option<i64>, GxdError> {
        self.inner.user_key(login)
    }

    fn probe_key(&self, name: &str) -> Result<Option<i64>, GxdError> {
        self.inner.probe_key(name)
    }

    fn marker_probe_count(&self, marker_id: &str) -> Result<usize, GxdError> {
        self.inner.marker_probe_count(marker_id)
    }

    fn figure_label_panes(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<(String, ImagePaneKey)>, GxdError> {
        self.inner.figure_label_panes(reference_key, image_type)
    }

    fn images_for_reference(
        &self,
        reference_key: i64,
        image_type: ImageType,
    ) -> Result<Vec<ImageRow>, GxdError> {
        self.inner.images_for_reference(reference_key, image_type)
    }

    fn specimen_result_keys(
        &self,
        assay_id: &str,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        self.inner.specimen_result_keys(assay_id, specimen_label)
    }

    fn probe_result_keys(
        &self,
        reference_key: i64,
        probe_key: i64,
        specimen_label: &str,
    ) -> Result<Vec<ResultKey>, GxdError> {
        self.inner
            .probe_result_keys(reference_key, probe_key, specimen_label)
    }

    fn next_accession_key(&self) -> Result<i64, GxdError> {
        self.inner.next_accession_key()
    }

    fn next_image_key(&self) -> Result<i64, GxdError> {
        self.inner.next_image_key()
    }

    fn next_image_pane_key(&self) -> Result<i64, GxdError> {
        self.inner.next_image_pane_key()
    }

    fn next_accession_number(&self, prefix: &str) -> Result<Option<i64>, GxdError> {
        self.inner.next_accession_number(prefix)
    }
}

fn mapping(text: &str) -> PixelMapping {
    PixelMapping::from_reader(text.as_bytes(), Utf8Path::new("pix.txt"), MalformedPolicy::Fail)
        .unwrap()
}

#[test]
fn mapped_file_resolves_through_pix_accession() {
    let pixels = mapping("img1.jpg\t001\nimg2.jpg\t002\n");
    let store = RecordingStore::new();
    let mut cache = ResolverCache::new();
    let mut errors: Vec<u8> = Vec::new();

    let pix_id = pixels.get("img1.jpg").unwrap();
    let first = cache
        .resolve_pane(&store, pix_id, 1, Some(&mut errors))
        .unwrap();
    let second = cache
        .resolve_pane(&store, pix_id, 5, Some(&mut errors))
        .unwrap();

    assert_eq!(pix_id.as_str(), "001");
    assert_eq!(first, Resolution::Found(ImagePaneKey(42)));
    assert_eq!(second, first);
    assert_eq!(store.lookups(), ["PIX:001"]);
    assert!(errors.is_empty());
}

#[test]
fn unknown_accession_is_reported_once_and_never_requeried() {
    let pixels = mapping("lost.jpg\t777\n");
    let store = RecordingStore::new();
    let mut cache = ResolverCache::new();
    let mut errors: Vec<u8> = Vec::new();

    let pix_id = pixels.get("lost.jpg").unwrap();
    for line in [12, 13, 14] {
        let resolution = cache
            .resolve_pane(&store, pix_id, line, Some(&mut errors))
            .unwrap();
        assert_eq!(resolution, Resolution::NotFound);
    }

    assert_eq!(
        String::from_utf8(errors).unwrap(),
        "Invalid Reference (12): PIX:777\n"
    );
    assert_eq!(store.lookups(), ["PIX:777"]);
}

#[test]
fn duplicate_mapping_resolves_the_last_entry() {
    let pixels = mapping("img1.jpg\t001\nimg1.jpg\t002\n");
    let store = RecordingStore::new();
    let mut cache = ResolverCache::new();

    let pix_id = pixels.get("img1.jpg").unwrap();
    let resolution = cache
        .resolve_pane(&store, pix_id, 1, Some(&mut Vec::<u8>::new()))
        .unwrap();

    assert_eq!(pix_id.as_str(), "002");
    assert_eq!(resolution, Resolution::Found(ImagePaneKey(0)));
    assert_eq!(store.lookups(), ["PIX:002"]);
}

#[test]
fn caches_are_independent() {
    let pixels = mapping("img1.jpg\t001\n");
    let store = RecordingStore::new();
    let pix_id = pixels.get("img1.jpg").unwrap();

    let mut first = ResolverCache::new();
    let mut second = ResolverCache::new();
    first
        .resolve_pane(&store, pix_id, 1, Some(&mut Vec::<u8>::new()))
        .unwrap();
    second
        .resolve_pane(&store, pix_id, 1, Some(&mut Vec::<u8>::new()))
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(store.lookups(), ["PIX:001", "PIX:001"]);
}
