//! Pixel ID to image pane resolution.
//!
//! Every distinct accession costs at most one round trip to the store for the
//! lifetime of a [`ResolverCache`]. Negative answers are cached too, so an
//! unresolvable accession is reported once and never queried again.

use std::collections::HashMap;
use std::io::Write;

use tracing::debug;

use crate::domain::{Accession, IMAGE_MGI_TYPE, ImagePaneKey, PixId};
use crate::error::GxdError;
use crate::store::ImageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(ImagePaneKey),
    NotFound,
}

impl Resolution {
    pub fn key(&self) -> Option<ImagePaneKey> {
        match self {
            Resolution::Found(key) => Some(*key),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: HashMap<Accession, Resolution>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, accession: &Accession) -> Option<Resolution> {
        self.entries.get(accession).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `pix_id` to its image pane.
    ///
    /// On a miss the store is asked for the `Image` object behind
    /// `PIX:<pix_id>` and then for that image's pane. Unresolvable accessions
    /// are written to `error_sink` as `Invalid Reference (<line>): <accession>`;
    /// pass `None` to suppress the diagnostic.
    pub fn resolve_pane<S, W>(
        &mut self,
        store: &S,
        pix_id: &PixId,
        line_number: usize,
        error_sink: Option<&mut W>,
    ) -> Result<Resolution, GxdError>
    where
        S: ImageStore + ?Sized,
        W: Write + ?Sized,
    {
        let accession = pix_id.accession();
        if let Some(resolution) = self.entries.get(&accession) {
            return Ok(*resolution);
        }

        let resolution = match store.object_key(&accession, IMAGE_MGI_TYPE)? {
            None => {
                report(error_sink, "Invalid Reference", line_number, &accession)?;
                Resolution::NotFound
            }
            Some(image_key) => match store.image_pane_key(image_key)? {
                Some(pane_key) => Resolution::Found(pane_key),
                None => {
                    report(error_sink, "Invalid Image Pane", line_number, &accession)?;
                    Resolution::NotFound
                }
            },
        };
        debug!(%accession, ?resolution, "resolved image pane");
        self.entries.insert(accession, resolution);
        Ok(resolution)
    }
}

fn report<W: Write + ?Sized>(
    sink: Option<&mut W>,
    label: &str,
    line_number: usize,
    accession: &Accession,
) -> Result<(), GxdError> {
    if let Some(sink) = sink {
        writeln!(sink, "{label} ({line_number}): {accession}")
            .map_err(|err| GxdError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{ImageType, JNumber, ResultKey};
    use crate::store::ImageRow;

    #[derive(Default)]
    struct CountingStore {
        object_calls: Mutex<usize>,
        pane_calls: Mutex<usize>,
    }

    impl ImageStore for CountingStore {
        fn object_key(&self, accession: &Accession, _mgi_type: &str) -> Result<Option<i64>, GxdError> {
            *self.object_calls.lock().unwrap() += 1;
            Ok(match accession.as_str() {
                "PIX:001" => Some(10),
                "PIX:002" => Some(20),
                _ => None,
            })
        }

        fn image_pane_key(&self, image_key: i64) -> Result<Option<ImagePaneKey>, GxdError> {
            *self.pane_calls.lock().unwrap() += 1;
            Ok(match image_key {
                10 => Some(ImagePaneKey(42)),
                _ => None,
            })
        }

        fn reference_key(&self, _jnumber: &JNumber) -> Result<Option<i64>, GxdError> {
            Ok(None)
        }

        fn user_key(&self, _login: &str) -> Result<Option<i64>, GxdError> {
            Ok(None)
        }

        fn probe_key(&self, _name: &str) -> Result<Option<i64>, GxdError> {
            Ok(None)
        }

        fn marker_probe_count(&self, _marker_id: &str) -> Result<usize, GxdError> {
            Ok(0)
        }

        fn figure_label_panes(
            &self,
            _reference_key: i64,
            _image_type: ImageType,
        ) -> Result<Vec<(String, ImagePaneKey)>, GxdError> {
            Ok(Vec::new())
        }

        fn images_for_reference(
            &self,
            _reference_key: i64,
            _image_type: ImageType,
        ) -> Result<Vec<ImageRow>, GxdError> {
            Ok(Vec::new())
        }

        fn specimen_result_keys(
            &self,
            _assay_id: &str,
            _specimen_label: &str,
        ) -> Result<Vec<ResultKey>, GxdError> {
            Ok(Vec::new())
        }

        fn probe_result_keys(
            &self,
            _reference_key: i64,
            _probe_key: i64,
            _specimen_label: &str,
        ) -> Result<Vec<ResultKey>, GxdError> {
            Ok(Vec::new())
        }

        fn next_accession_key(&self) -> Result<i64, GxdError> {
            Ok(1)
        }

        fn next_image_key(&self) -> Result<i64, GxdError> {
            Ok(1)
        }

        fn next_image_pane_key(&self) -> Result<i64, GxdError> {
            Ok(1)
        }

        fn next_accession_number(&self, _prefix: &str) -> Result<Option<i64>, GxdError> {
            Ok(None)
        }
    }

    fn no_sink() -> Option<&'static mut Vec<u8>> {
        None
    }

    #[test]
    fn second_lookup_hits_cache() {
        let store = CountingStore::default();
        let mut cache = ResolverCache::new();
        let id: PixId = "001".parse().unwrap();

        let first = cache.resolve_pane(&store, &id, 1, no_sink()).unwrap();
        let second = cache.resolve_pane(&store, &id, 2, no_sink()).unwrap();

        assert_eq!(first, Resolution::Found(ImagePaneKey(42)));
        assert_eq!(second, first);
        assert_eq!(*store.object_calls.lock().unwrap(), 1);
        assert_eq!(*store.pane_calls.lock().unwrap(), 1);
    }

    #[test]
    fn unknown_accession_reports_once() {
        let store = CountingStore::default();
        let mut cache = ResolverCache::new();
        let id: PixId = "999".parse().unwrap();
        let mut errors: Vec<u8> = Vec::new();

        let first = cache.resolve_pane(&store, &id, 7, Some(&mut errors)).unwrap();
        let again = cache.resolve_pane(&store, &id, 9, Some(&mut errors)).unwrap();

        assert_eq!(first, Resolution::NotFound);
        assert_eq!(again, Resolution::NotFound);
        assert_eq!(
            String::from_utf8(errors).unwrap(),
            "Invalid Reference (7): PIX:999\n"
        );
        assert_eq!(*store.object_calls.lock().unwrap(), 1);
    }

    #[test]
    fn image_without_pane_is_not_found() {
        let store = CountingStore::default();
        let mut cache = ResolverCache::new();
        let id: PixId = "002".parse().unwrap();
        let mut errors: Vec<u8> = Vec::new();

        let resolution = cache.resolve_pane(&store, &id, 3, Some(&mut errors)).unwrap();

        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(
            String::from_utf8(errors).unwrap(),
            "Invalid Image Pane (3): PIX:002\n"
        );
    }

    #[test]
    fn missing_sink_suppresses_diagnostics() {
        let store = CountingStore::default();
        let mut cache = ResolverCache::new();
        let id: PixId = "404".parse().unwrap();

        let resolution = cache.resolve_pane(&store, &id, 1, no_sink()).unwrap();
        assert!(!resolution.is_found());
        assert_eq!(cache.get(&id.accession()), Some(Resolution::NotFound));
    }

    #[test]
    fn pane_key_zero_is_a_real_key() {
        let resolution = Resolution::Found(ImagePaneKey(0));
        assert_eq!(resolution.key(), Some(ImagePaneKey(0)));
        assert!(resolution.is_found());
    }
}
