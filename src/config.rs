use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::JNumber;
use crate::error::GxdError;
use crate::schema::{FieldSpec, MalformedPolicy, RecordSchema, RepeatGroup};

pub const DEFAULT_CONFIG_FILE: &str = "gxd-imgload.json";
pub const ASSOC_TABLE: &str = "GXD_InSituResultImage";
pub const ACCESSION_TABLE: &str = "ACC_Accession";
pub const IMAGE_TABLE: &str = "IMG_Image";
pub const IMAGE_PANE_TABLE: &str = "IMG_ImagePane";
/// `_ImageType_key` of Full Size images.
pub const FULL_SIZE_IMAGE_TYPE_KEY: i64 = 1072158;

/// Per-publication load profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub reference: String,
    #[serde(default)]
    pub malformed: Option<MalformedPolicy>,
    #[serde(default)]
    pub prep: Option<PrepEntry>,
    #[serde(default)]
    pub specimen_assoc: Option<SpecimenAssocEntry>,
    #[serde(default)]
    pub probe_assoc: Option<ProbeAssocEntry>,
    #[serde(default)]
    pub figure_assoc: Option<FigureAssocEntry>,
    #[serde(default)]
    pub accessions: Option<AccessionEntry>,
    #[serde(default)]
    pub load_images: Option<LoadImagesEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilenameRewrite {
    pub find: String,
    pub replace: String,
}

impl FilenameRewrite {
    /// Replaces the first occurrence only, e.g. `MH00000099_0001B.jpg` ->
    /// `MH00000099_00001B.jpg` for `_` -> `_0`.
    pub fn apply(&self, file_name: &str) -> String {
        file_name.replacen(&self.find, &self.replace, 1)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PrepEntry {
    pub image_list: String,
    pub pixel_file: String,
    pub image_output: String,
    pub pane_output: String,
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default)]
    pub marker_column: Option<usize>,
    pub first_image_column: usize,
    pub stride: usize,
    #[serde(default)]
    pub file_offset: usize,
    #[serde(default)]
    pub label_offset: Option<usize>,
    #[serde(default)]
    pub filename_rewrite: Option<FilenameRewrite>,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub image_class: Option<String>,
    #[serde(default)]
    pub multi_probe_note: Option<String>,
    #[serde(default)]
    pub pane_dimensions: bool,
    #[serde(default)]
    pub dedupe_files: bool,
    /// Thumbnail images: write the Full Size image key of each figure label.
    #[serde(default)]
    pub thumbnail: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SpecimenAssocEntry {
    pub assay_file: String,
    pub image_file: String,
    pub pixel_file: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_true")]
    pub assay_header: bool,
    #[serde(default)]
    pub assay_id_column: usize,
    #[serde(default = "default_assay_images_column")]
    pub images_column: usize,
    #[serde(default = "default_images_separator")]
    pub images_separator: String,
    #[serde(default)]
    pub image_header: bool,
    #[serde(default = "default_image_file_column")]
    pub image_file_column: usize,
    #[serde(default = "default_specimen_column")]
    pub specimen_column: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InSituInput {
    pub file: String,
    pub specimen_label: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProbeAssocEntry {
    pub pixel_file: String,
    pub probe_prefix: String,
    pub inputs: Vec<InSituInput>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default = "default_probe_column")]
    pub probe_column: usize,
    #[serde(default = "default_image_column")]
    pub image_column: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FigureAssocEntry {
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub header: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccessionEntry {
    pub logical_db: i64,
    #[serde(default)]
    pub label_prefix: String,
    #[serde(default)]
    pub created_after: Option<NaiveDate>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// Loads the image and pane files `prep` wrote. Input files default to the
/// `prep` section's outputs.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoadImagesEntry {
    #[serde(default)]
    pub image_file: Option<String>,
    #[serde(default)]
    pub pane_file: Option<String>,
    /// Whether the image file carries an image class column.
    #[serde(default)]
    pub image_class: Option<bool>,
    #[serde(default = "default_image_type_key")]
    pub image_type_key: i64,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "default_copyright_notes")]
    pub copyright_notes: String,
    #[serde(default = "default_caption_notes")]
    pub caption_notes: String,
}

fn default_true() -> bool {
    true
}

fn default_assay_images_column() -> usize {
    2
}

fn default_images_separator() -> String {
    "; ".to_string()
}

fn default_image_file_column() -> usize {
    1
}

fn default_specimen_column() -> usize {
    2
}

fn default_probe_column() -> usize {
    1
}

fn default_image_column() -> usize {
    2
}

fn default_image_type_key() -> i64 {
    FULL_SIZE_IMAGE_TYPE_KEY
}

fn default_copyright_notes() -> String {
    "IMG_Copyright.in".to_string()
}

fn default_caption_notes() -> String {
    "IMG_Caption.in".to_string()
}

/// Where relative file names in the profile are looked up.
#[derive(Debug, Clone)]
pub struct Directories {
    pub data_dir: Utf8PathBuf,
    pub pixel_dir: Utf8PathBuf,
}

impl Directories {
    pub fn data_file(&self, name: &str) -> Utf8PathBuf {
        self.data_dir.join(name)
    }
}

#[derive(Debug, Clone)]
pub struct PrepJob {
    pub reference: JNumber,
    pub image_list: Utf8PathBuf,
    pub pixel_file: Utf8PathBuf,
    pub pixel_dir: Utf8PathBuf,
    pub image_output: Utf8PathBuf,
    pub pane_output: Utf8PathBuf,
    pub schema: RecordSchema,
    pub filename_rewrite: Option<FilenameRewrite>,
    pub copyright: String,
    pub caption: String,
    pub image_class: Option<String>,
    pub multi_probe_note: Option<String>,
    pub pane_dimensions: bool,
    pub dedupe_files: bool,
    pub thumbnail: bool,
}

#[derive(Debug, Clone)]
pub struct SpecimenAssocJob {
    pub assay_file: Utf8PathBuf,
    pub image_file: Utf8PathBuf,
    pub pixel_file: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub assay_schema: RecordSchema,
    pub image_schema: RecordSchema,
}

#[derive(Debug, Clone)]
pub struct ProbeAssocJob {
    pub reference: JNumber,
    pub pixel_file: Utf8PathBuf,
    pub probe_prefix: String,
    pub inputs: Vec<(Utf8PathBuf, String)>,
    pub output: Utf8PathBuf,
    pub schema: RecordSchema,
}

#[derive(Debug, Clone)]
pub struct FigureAssocJob {
    pub reference: JNumber,
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub schema: RecordSchema,
}

#[derive(Debug, Clone)]
pub struct AccessionJob {
    pub reference: JNumber,
    pub logical_db: i64,
    pub label_prefix: String,
    pub created_after: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoadImagesJob {
    pub image_file: Utf8PathBuf,
    pub pane_file: Utf8PathBuf,
    pub image_schema: RecordSchema,
    pub pane_schema: RecordSchema,
    pub image_type_key: i64,
    pub created_by: Option<String>,
    pub image_output: Utf8PathBuf,
    pub pane_output: Utf8PathBuf,
    pub accession_output: Utf8PathBuf,
    pub copyright_notes: Utf8PathBuf,
    pub caption_notes: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub reference: JNumber,
    pub malformed: MalformedPolicy,
    pub prep: Option<PrepJob>,
    pub specimen_assoc: Option<SpecimenAssocJob>,
    pub probe_assoc: Option<ProbeAssocJob>,
    pub figure_assoc: Option<FigureAssocJob>,
    pub accessions: Option<AccessionJob>,
    pub load_images: Option<LoadImagesJob>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Utf8Path>, dirs: &Directories) -> Result<ResolvedConfig, GxdError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path.as_std_path()),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(GxdError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GxdError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GxdError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, dirs)
    }

    pub fn resolve_config(config: Config, dirs: &Directories) -> Result<ResolvedConfig, GxdError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let reference: JNumber = config.reference.parse()?;

        let prep = config
            .prep
            .map(|entry| resolve_prep(entry, &reference, dirs))
            .transpose()?;
        let load_images = config
            .load_images
            .map(|entry| resolve_load_images(entry, prep.as_ref(), dirs));

        let specimen_assoc = config.specimen_assoc.map(|entry| SpecimenAssocJob {
            assay_file: dirs.data_file(&entry.assay_file),
            image_file: dirs.data_file(&entry.image_file),
            pixel_file: dirs.data_file(&entry.pixel_file),
            output: assoc_output(dirs, entry.output.as_deref()),
            assay_schema: RecordSchema::new(
                entry.assay_header,
                vec![
                    FieldSpec::text("assay_id", entry.assay_id_column),
                    FieldSpec::list("images", entry.images_column, &entry.images_separator),
                ],
            ),
            image_schema: RecordSchema::new(
                entry.image_header,
                vec![
                    FieldSpec::text("file", entry.image_file_column),
                    FieldSpec::text("specimen", entry.specimen_column),
                ],
            ),
        });

        let probe_assoc = config.probe_assoc.map(|entry| ProbeAssocJob {
            reference: reference.clone(),
            pixel_file: dirs.data_file(&entry.pixel_file),
            probe_prefix: entry.probe_prefix,
            inputs: entry
                .inputs
                .into_iter()
                .map(|input| (dirs.data_file(&input.file), input.specimen_label))
                .collect(),
            output: assoc_output(dirs, entry.output.as_deref()),
            schema: RecordSchema::new(
                entry.header,
                vec![
                    FieldSpec::text("probe", entry.probe_column),
                    FieldSpec::text("image", entry.image_column),
                ],
            ),
        });

        let figure_assoc = config.figure_assoc.map(|entry| FigureAssocJob {
            reference: reference.clone(),
            input: dirs.data_file(&entry.input),
            output: assoc_output(dirs, entry.output.as_deref()),
            schema: RecordSchema::new(
                entry.header,
                vec![FieldSpec::integer("result", 0), FieldSpec::text("label", 1)],
            ),
        });

        let accessions = config.accessions.map(|entry| AccessionJob {
            reference: reference.clone(),
            logical_db: entry.logical_db,
            label_prefix: entry.label_prefix,
            created_after: entry.created_after,
            created_by: entry.created_by,
            output: dirs.data_file(
                entry
                    .output
                    .as_deref()
                    .unwrap_or(&format!("{ACCESSION_TABLE}.bcp")),
            ),
        });

        Ok(ResolvedConfig {
            schema_version,
            reference,
            malformed: config.malformed.unwrap_or_default(),
            prep,
            specimen_assoc,
            probe_assoc,
            figure_assoc,
            accessions,
            load_images,
        })
    }
}

fn resolve_prep(
    entry: PrepEntry,
    reference: &JNumber,
    dirs: &Directories,
) -> Result<PrepJob, GxdError> {
    if entry.stride == 0 {
        return Err(GxdError::InvalidProfile(
            "prep.stride must be positive".to_string(),
        ));
    }
    let offsets = [
        ("file_offset", Some(entry.file_offset)),
        ("label_offset", entry.label_offset),
    ];
    for (name, offset) in offsets {
        if let Some(offset) = offset.filter(|offset| *offset >= entry.stride) {
            return Err(GxdError::InvalidProfile(format!(
                "prep.{name} {offset} falls outside a group of {} columns",
                entry.stride
            )));
        }
    }

    let mut fields = Vec::new();
    if let Some(column) = entry.marker_column {
        fields.push(FieldSpec::text("marker", column).optional());
    }
    let mut group = vec![("file".to_string(), entry.file_offset)];
    if let Some(offset) = entry.label_offset {
        group.push(("label".to_string(), offset));
    }
    let schema = RecordSchema::new(entry.header, fields).with_repeat(RepeatGroup {
        start: entry.first_image_column,
        stride: entry.stride,
        fields: group,
    });

    Ok(PrepJob {
        reference: reference.clone(),
        image_list: dirs.data_file(&entry.image_list),
        pixel_file: dirs.data_file(&entry.pixel_file),
        pixel_dir: dirs.pixel_dir.clone(),
        image_output: dirs.data_file(&entry.image_output),
        pane_output: dirs.data_file(&entry.pane_output),
        schema,
        filename_rewrite: entry.filename_rewrite,
        copyright: entry.copyright,
        caption: entry.caption,
        image_class: entry.image_class,
        multi_probe_note: entry.multi_probe_note,
        pane_dimensions: entry.pane_dimensions,
        dedupe_files: entry.dedupe_files,
        thumbnail: entry.thumbnail,
    })
}

fn resolve_load_images(
    entry: LoadImagesEntry,
    prep: Option<&PrepJob>,
    dirs: &Directories,
) -> LoadImagesJob {
    let input = |name: Option<&str>, prepped: Option<&Utf8PathBuf>, fallback: &str| match name {
        Some(name) => dirs.data_file(name),
        None => prepped
            .cloned()
            .unwrap_or_else(|| dirs.data_file(fallback)),
    };
    let image_class = entry
        .image_class
        .unwrap_or_else(|| prep.is_some_and(|job| job.image_class.is_some()));

    // reference, image key, [class], pixel ID, x, y, figure label, copyright, caption
    let mut fields = vec![
        FieldSpec::text("reference", 0),
        FieldSpec::text("image_key", 1),
    ];
    let mut column = 2;
    if image_class {
        fields.push(FieldSpec::text("class", column));
        column += 1;
    }
    fields.extend([
        FieldSpec::text("pix_id", column),
        FieldSpec::integer("xdim", column + 1),
        FieldSpec::integer("ydim", column + 2),
        FieldSpec::text("label", column + 3),
        FieldSpec::text("copyright", column + 4).optional(),
        FieldSpec::text("caption", column + 5).optional(),
    ]);

    LoadImagesJob {
        image_file: input(
            entry.image_file.as_deref(),
            prep.map(|job| &job.image_output),
            "image.txt",
        ),
        pane_file: input(
            entry.pane_file.as_deref(),
            prep.map(|job| &job.pane_output),
            "imagepane.txt",
        ),
        image_schema: RecordSchema::new(false, fields),
        pane_schema: RecordSchema::new(
            false,
            vec![
                FieldSpec::text("pix_id", 0),
                FieldSpec::text("label", 1).optional(),
            ],
        ),
        image_type_key: entry.image_type_key,
        created_by: entry.created_by,
        image_output: dirs.data_file(&format!("{IMAGE_TABLE}.bcp")),
        pane_output: dirs.data_file(&format!("{IMAGE_PANE_TABLE}.bcp")),
        accession_output: dirs.data_file(&format!("{ACCESSION_TABLE}.bcp")),
        copyright_notes: dirs.data_file(&entry.copyright_notes),
        caption_notes: dirs.data_file(&entry.caption_notes),
    }
}

fn assoc_output(dirs: &Directories, name: Option<&str>) -> Utf8PathBuf {
    match name {
        Some(name) => dirs.data_file(name),
        None => dirs.data_file(&format!("{ASSOC_TABLE}.bcp")),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn dirs() -> Directories {
        Directories {
            data_dir: Utf8PathBuf::from("/data/tr8270"),
            pixel_dir: Utf8PathBuf::from("/pixeldb"),
        }
    }

    #[test]
    fn resolves_paths_and_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "reference": "J:122989",
                "specimen_assoc": {
                    "assay_file": "ASSAYS.txt",
                    "image_file": "IMAGES.txt",
                    "pixel_file": "/pix/pix103446.txt"
                }
            }"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config, &dirs()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.malformed, MalformedPolicy::Skip);
        let job = resolved.specimen_assoc.unwrap();
        assert_eq!(job.assay_file, "/data/tr8270/ASSAYS.txt");
        assert_eq!(job.pixel_file, "/pix/pix103446.txt");
        assert_eq!(job.output, "/data/tr8270/GXD_InSituResultImage.bcp");
        assert!(job.assay_schema.header);
        assert!(!job.image_schema.header);
    }

    #[test]
    fn prep_layout_becomes_repeat_group() {
        let config: Config = serde_json::from_str(
            r#"{
                "reference": "J:122989",
                "prep": {
                    "image_list": "ImageListFigLabels.txt",
                    "pixel_file": "Pix_Fullsize.txt",
                    "image_output": "image_Fullsize.txt",
                    "pane_output": "imagepane_Fullsize.txt",
                    "first_image_column": 9,
                    "stride": 4,
                    "label_offset": 1,
                    "filename_rewrite": {"find": "_", "replace": "_0"}
                }
            }"#,
        )
        .unwrap();

        let job = ConfigLoader::resolve_config(config, &dirs())
            .unwrap()
            .prep
            .unwrap();
        let repeat = job.schema.repeat.unwrap();
        assert_eq!(repeat.start, 9);
        assert_eq!(repeat.stride, 4);
        assert_eq!(repeat.fields.len(), 2);
        assert_eq!(
            job.filename_rewrite.unwrap().apply("MH00000099_0001B.jpg"),
            "MH00000099_00001B.jpg"
        );
    }

    fn prep_profile(layout: &str) -> Config {
        serde_json::from_str(&format!(
            r#"{{
                "reference": "J:122989",
                "prep": {{
                    "image_list": "ImageList.txt",
                    "pixel_file": "Pix.txt",
                    "image_output": "image.txt",
                    "pane_output": "imagepane.txt",
                    "first_image_column": 9,
                    {layout}
                }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn rejects_group_layouts_that_cannot_decode() {
        for layout in [
            r#""stride": 0"#,
            r#""stride": 2, "file_offset": 2"#,
            r#""stride": 4, "label_offset": 4"#,
        ] {
            assert_matches!(
                ConfigLoader::resolve_config(prep_profile(layout), &dirs()),
                Err(GxdError::InvalidProfile(_)),
                "{}",
                layout
            );
        }
        let job = ConfigLoader::resolve_config(prep_profile(r#""stride": 1"#), &dirs())
            .unwrap()
            .prep
            .unwrap();
        assert_eq!(job.schema.repeat.unwrap().stride, 1);
    }

    #[test]
    fn image_load_reads_prep_outputs() {
        let mut config =
            prep_profile(r#""stride": 4, "label_offset": 1, "image_class": "Expression""#);
        config.load_images = Some(serde_json::from_str("{}").unwrap());

        let resolved = ConfigLoader::resolve_config(config, &dirs()).unwrap();
        let job = resolved.load_images.unwrap();
        assert_eq!(job.image_file, "/data/tr8270/image.txt");
        assert_eq!(job.pane_file, "/data/tr8270/imagepane.txt");
        assert_eq!(job.image_type_key, FULL_SIZE_IMAGE_TYPE_KEY);
        assert_eq!(job.image_output, "/data/tr8270/IMG_Image.bcp");
        assert_eq!(job.caption_notes, "/data/tr8270/IMG_Caption.in");
        let pix = job
            .image_schema
            .fields
            .iter()
            .find(|field| field.name == "pix_id")
            .unwrap();
        assert_eq!(pix.position, 3);
    }

    #[test]
    fn rejects_bad_reference() {
        let config: Config = serde_json::from_str(r#"{"reference": "122989"}"#).unwrap();
        assert_matches!(
            ConfigLoader::resolve_config(config, &dirs()),
            Err(GxdError::InvalidJNumber(_))
        );
    }
}
