use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{
    ACCESSION_TABLE, ASSOC_TABLE, AccessionJob, FigureAssocJob, IMAGE_PANE_TABLE, IMAGE_TABLE,
    LoadImagesJob, PrepJob, ProbeAssocJob, SpecimenAssocJob,
};
use crate::domain::{
    AssociationRecord, ImageAccessionId, ImagePaneKey, ImageType, JNumber, MGI_PREFIX,
    PIX_PREFIX, ProcessingMode, ResultKey, bcp_date,
};
use crate::error::GxdError;
use crate::fs_util::{self, TsvWriter};
use crate::loader::{BulkLoader, RecordCount};
use crate::pixel::PixelMapping;
use crate::resolver::ResolverCache;
use crate::schema::{MalformedPolicy, Record, RecordSchema};
use crate::store::ImageStore;

const IMAGE_MGITYPE_KEY: &str = "9";
const ACC_PREFERRED: &str = "1";
const MGI_LOGICAL_DB: i64 = 1;
const PIX_LOGICAL_DB: i64 = 19;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub operation: String,
    pub mode: String,
    pub records_read: usize,
    pub rows_written: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub outputs: Vec<String>,
    pub loads: Vec<LoadSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub table: String,
    pub file: String,
    pub records: RecordCount,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Error-file lines for one run; `None` discards them.
struct ErrorLines<'w> {
    sink: Option<&'w mut dyn Write>,
}

impl<'w> ErrorLines<'w> {
    fn line(&mut self, args: fmt::Arguments<'_>) -> Result<(), GxdError> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_fmt(args)
                .and_then(|_| sink.write_all(b"\n"))
                .map_err(|err| GxdError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn writer(&mut self) -> Option<&mut (dyn Write + 'w)> {
        self.sink.as_deref_mut()
    }
}

struct Decoded {
    records: Vec<Record>,
    skipped: usize,
}

pub struct App<S: ImageStore, L: BulkLoader> {
    store: S,
    loader: L,
    mode: ProcessingMode,
    malformed: MalformedPolicy,
    today: NaiveDate,
}

impl<S: ImageStore, L: BulkLoader> App<S, L> {
    pub fn new(store: S, loader: L, mode: ProcessingMode) -> Self {
        Self {
            store,
            loader,
            mode,
            malformed: MalformedPolicy::default(),
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    /// Fixes the creation/modification date stamped on output rows.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.today = date;
        self
    }

    /// Writes the image and image-pane input files for the image load.
    pub fn prepare_images(
        &self,
        job: &PrepJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("prep");

        sink.event(phase("Read", format!("pixel mapping {}", job.pixel_file)));
        let pixels = PixelMapping::load(&job.pixel_file, self.malformed)?;
        let decoded = self.decode_file(&job.image_list, &job.schema, sink)?;
        summary.records_read = decoded.records.len();
        summary.skipped = decoded.skipped;

        let mut images = TsvWriter::create(&job.image_output)?;
        let mut panes = TsvWriter::create(&job.pane_output)?;
        let mut seen = HashSet::new();
        let mut probe_counts = HashMap::new();
        let full_size = if job.thumbnail {
            let reference_key = self.reference_key(&job.reference)?;
            let lookup = self
                .store
                .images_for_reference(reference_key, ImageType::FullSize)?
                .into_iter()
                .map(|image| (image.figure_label, image.image_key))
                .collect::<HashMap<String, i64>>();
            debug!(labels = lookup.len(), "full size image lookup built");
            Some(lookup)
        } else {
            None
        };

        sink.event(phase("Transform", format!("{} records", decoded.records.len())));
        for record in &decoded.records {
            let caption = self.caption_for(record, job, &mut probe_counts)?;
            for group in record.groups() {
                let raw = group.get("file").map(|f| f.trim()).unwrap_or_default();
                if raw.is_empty() {
                    continue;
                }
                let file_name = match &job.filename_rewrite {
                    Some(rewrite) => rewrite.apply(raw),
                    None => raw.to_string(),
                };
                if job.dedupe_files && !seen.insert(file_name.clone()) {
                    continue;
                }
                let Some(pix_id) = pixels.get(&file_name) else {
                    debug!(file = %file_name, line = record.line_number, "not in pixel DB intake");
                    continue;
                };

                let figure_label = match group.get("label") {
                    Some(label) => label.trim().to_string(),
                    None => file_name.clone(),
                };
                let image_key = match &full_size {
                    Some(lookup) => lookup
                        .get(&figure_label)
                        .map(i64::to_string)
                        .ok_or_else(|| GxdError::FullSizeImageMissing(figure_label.clone()))?,
                    None => String::new(),
                };

                let image_path = job.pixel_dir.join(format!("{pix_id}.jpg"));
                let (xdim, ydim) = match fs_util::image_dimensions(&image_path) {
                    Ok(dims) => dims,
                    Err(err) => {
                        warn!(%err, "skipping image");
                        errors.line(format_args!(
                            "Cannot Read Image ({}): {}",
                            record.line_number, image_path
                        ))?;
                        summary.unresolved += 1;
                        continue;
                    }
                };
                let mut row = vec![job.reference.to_string(), image_key];
                if let Some(class) = &job.image_class {
                    row.push(class.clone());
                }
                row.extend([
                    pix_id.to_string(),
                    xdim.to_string(),
                    ydim.to_string(),
                    figure_label,
                    job.copyright.clone(),
                    caption.clone(),
                ]);
                images.write_row(&row)?;

                let mut pane_row = vec![pix_id.to_string(), String::new()];
                if job.pane_dimensions && !job.thumbnail {
                    pane_row.extend([xdim.to_string(), ydim.to_string()]);
                }
                panes.write_row(&pane_row)?;
            }
        }

        summary.rows_written = images.rows();
        sink.event(phase("Store", "writing files".to_string()));
        summary.outputs.push(images.finish()?.to_string());
        summary.outputs.push(panes.finish()?.to_string());
        Ok(summary)
    }

    /// Associates image panes with the in-situ results of the specimen each
    /// image shows.
    pub fn associate_specimens(
        &self,
        job: &SpecimenAssocJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("assoc-specimens");

        sink.event(phase("Read", format!("pixel mapping {}", job.pixel_file)));
        let pixels = PixelMapping::load(&job.pixel_file, self.malformed)?;
        let images = self.decode_file(&job.image_file, &job.image_schema, sink)?;
        let specimens = images
            .records
            .iter()
            .filter_map(|r| Some((r.text("file")?.to_string(), r.text("specimen")?.to_string())))
            .collect::<HashMap<_, _>>();
        let assays = self.decode_file(&job.assay_file, &job.assay_schema, sink)?;
        summary.records_read = assays.records.len();
        summary.skipped = images.skipped + assays.skipped;

        let mut cache = ResolverCache::new();
        let mut writer = TsvWriter::create(&job.output)?;

        sink.event(phase("Resolve", format!("{} assays", assays.records.len())));
        for record in &assays.records {
            let line = record.line_number;
            let assay_id = record.text("assay_id").unwrap_or_default();
            for file_name in record.list("images") {
                let (Some(pix_id), Some(specimen)) =
                    (pixels.get(file_name), specimens.get(file_name))
                else {
                    errors.line(format_args!("Cannot Find Image ({line}): {file_name}"))?;
                    summary.unresolved += 1;
                    continue;
                };
                let resolution =
                    cache.resolve_pane(&self.store, pix_id, line, errors.writer())?;
                let Some(pane) = resolution.key() else {
                    summary.unresolved += 1;
                    continue;
                };
                let results = self.store.specimen_result_keys(assay_id, specimen)?;
                write_associations(&mut writer, &results, pane, self.today)?;
            }
        }

        self.finish_assoc(writer, summary, sink)
    }

    /// Associates image panes with the in-situ results of assays that used
    /// the probe named on each line.
    pub fn associate_probes(
        &self,
        job: &ProbeAssocJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("assoc-probes");

        let reference_key = self.reference_key(&job.reference)?;
        let pixels = PixelMapping::load(&job.pixel_file, self.malformed)?;
        let mut probe_keys: HashMap<String, Option<i64>> = HashMap::new();
        let mut cache = ResolverCache::new();
        let mut writer = TsvWriter::create(&job.output)?;

        for (path, specimen_label) in &job.inputs {
            let decoded = self.decode_file(path, &job.schema, sink)?;
            summary.records_read += decoded.records.len();
            summary.skipped += decoded.skipped;

            sink.event(phase("Resolve", format!("{path} (specimen {specimen_label})")));
            for record in &decoded.records {
                let line = record.line_number;
                let image = record.text("image").unwrap_or_default();
                let Some(pix_id) = pixels.get(image) else {
                    errors.line(format_args!("Cannot Find Image ({line}): {image}"))?;
                    summary.unresolved += 1;
                    continue;
                };

                let probe_name =
                    format!("{}{}", job.probe_prefix, record.text("probe").unwrap_or_default());
                let probe_key = match probe_keys.get(&probe_name) {
                    Some(key) => *key,
                    None => {
                        let key = self.store.probe_key(&probe_name)?;
                        probe_keys.insert(probe_name.clone(), key);
                        key
                    }
                };
                let Some(probe_key) = probe_key else {
                    errors.line(format_args!("Cannot Find Probe ({line}): {probe_name}"))?;
                    summary.unresolved += 1;
                    continue;
                };

                let resolution =
                    cache.resolve_pane(&self.store, pix_id, line, errors.writer())?;
                let Some(pane) = resolution.key() else {
                    summary.unresolved += 1;
                    continue;
                };
                let results =
                    self.store
                        .probe_result_keys(reference_key, probe_key, specimen_label)?;
                write_associations(&mut writer, &results, pane, self.today)?;
            }
        }

        self.finish_assoc(writer, summary, sink)
    }

    /// Associates results with the full-size image panes of the reference by
    /// figure label.
    pub fn associate_figures(
        &self,
        job: &FigureAssocJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("assoc-figures");

        let reference_key = self.reference_key(&job.reference)?;
        let lookup = self
            .store
            .figure_label_panes(reference_key, ImageType::FullSize)?
            .into_iter()
            .collect::<HashMap<String, ImagePaneKey>>();
        debug!(labels = lookup.len(), "figure label lookup built");

        let decoded = self.decode_file(&job.input, &job.schema, sink)?;
        summary.records_read = decoded.records.len();
        summary.skipped = decoded.skipped;

        let mut writer = TsvWriter::create(&job.output)?;
        for record in &decoded.records {
            let (Some(result), Some(label)) = (record.integer("result"), record.text("label"))
            else {
                continue;
            };
            match lookup.get(label) {
                Some(pane) => {
                    let assoc = AssociationRecord::new(ResultKey(result), *pane, self.today);
                    writer.write_row(&assoc.fields())?;
                }
                None => {
                    errors.line(format_args!(
                        "Missing pane key for figure label ({}): {label}",
                        record.line_number
                    ))?;
                    summary.unresolved += 1;
                }
            }
        }

        self.finish_assoc(writer, summary, sink)
    }

    /// Creates accession IDs for full-size images, derived from the part of
    /// the figure label before the first `_`.
    pub fn create_image_accessions(
        &self,
        job: &AccessionJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("accessions");

        let user_key = self.user_key(job.created_by.as_deref())?;
        let reference_key = self.reference_key(&job.reference)?;
        let mut acc_key = self.store.next_accession_key()?;
        let date = bcp_date(self.today);

        sink.event(phase("Resolve", format!("images of {}", job.reference)));
        let images = self
            .store
            .images_for_reference(reference_key, ImageType::FullSize)?;
        let mut writer = TsvWriter::create(&job.output)?;
        for image in images {
            if !image.figure_label.starts_with(&job.label_prefix) {
                continue;
            }
            if let Some(after) = job.created_after {
                if !image.creation_date.is_some_and(|created| created > after) {
                    continue;
                }
            }
            summary.records_read += 1;
            let Some(acc) = ImageAccessionId::from_figure_label(&image.figure_label) else {
                errors.line(format_args!(
                    "Invalid Figure Label ({}): {:?}",
                    image.image_key, image.figure_label
                ))?;
                summary.skipped += 1;
                continue;
            };
            writer.write_row(&accession_row(
                acc_key,
                acc,
                job.logical_db,
                image.image_key,
                false,
                user_key,
                &date,
            ))?;
            acc_key += 1;
        }

        summary.rows_written = writer.rows();
        let output = writer.finish()?;
        summary.outputs.push(output.to_string());
        summary.loads = self.publish(ACCESSION_TABLE, &output, sink)?;
        Ok(summary)
    }

    /// Loads the image and pane files `prep` wrote. Every image gets an image
    /// row, an MGI accession and a private pixel DB accession. Every pane row
    /// is attached to the image with the same pixel ID. Copyright and caption
    /// notes are written keyed by the new MGI ID.
    pub fn load_images(
        &self,
        job: &LoadImagesJob,
        errors: Option<&mut dyn Write>,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        let mut errors = ErrorLines { sink: errors };
        let mut summary = self.summary("load-images");

        let user_key = self.user_key(job.created_by.as_deref())?;
        let mut image_key = self.store.next_image_key()?;
        let mut pane_key = self.store.next_image_pane_key()?;
        let mut acc_key = self.store.next_accession_key()?;
        let first_mgi_number = self
            .store
            .next_accession_number(MGI_PREFIX)?
            .ok_or_else(|| GxdError::AccessionMaxMissing(MGI_PREFIX.to_string()))?;
        let mut mgi_number = first_mgi_number;
        debug!(image_key, pane_key, acc_key, mgi_number, "primary keys");
        let date = bcp_date(self.today);
        let creator = user_key.to_string();

        let image_lines = self.decode_file(&job.image_file, &job.image_schema, sink)?;
        let pane_lines = self.decode_file(&job.pane_file, &job.pane_schema, sink)?;
        summary.records_read = image_lines.records.len() + pane_lines.records.len();
        summary.skipped = image_lines.skipped + pane_lines.skipped;

        let mut images = TsvWriter::create(&job.image_output)?;
        let mut panes = TsvWriter::create(&job.pane_output)?;
        let mut accessions = TsvWriter::create(&job.accession_output)?;
        let mut copyrights = TsvWriter::create(&job.copyright_notes)?;
        let mut captions = TsvWriter::create(&job.caption_notes)?;
        let mut references: HashMap<String, Option<i64>> = HashMap::new();
        let mut image_keys: HashMap<String, i64> = HashMap::new();

        sink.event(phase("Transform", format!("{} images", image_lines.records.len())));
        for record in &image_lines.records {
            let line = record.line_number;
            let jnumber = record.text("reference").unwrap_or_default();
            let reference_key = match references.get(jnumber) {
                Some(key) => *key,
                None => {
                    let key = match jnumber.parse::<JNumber>() {
                        Ok(jnumber) => self.store.reference_key(&jnumber)?,
                        Err(_) => None,
                    };
                    references.insert(jnumber.to_string(), key);
                    key
                }
            };
            let Some(reference_key) = reference_key else {
                errors.line(format_args!("Invalid Reference ({line}): {jnumber}"))?;
                summary.unresolved += 1;
                continue;
            };
            let pix_id = record.text("pix_id").unwrap_or_default();

            let mut row = vec![image_key.to_string(), job.image_type_key.to_string()];
            if let Some(class) = record.text("class") {
                row.push(class.to_string());
            }
            row.extend([
                reference_key.to_string(),
                record.text("image_key").unwrap_or_default().to_string(),
                record.integer("xdim").unwrap_or_default().to_string(),
                record.integer("ydim").unwrap_or_default().to_string(),
                record.text("label").unwrap_or_default().to_string(),
                creator.clone(),
                creator.clone(),
                date.clone(),
                date.clone(),
            ]);
            images.write_row(&row)?;

            let mgi_id = ImageAccessionId::new(MGI_PREFIX, mgi_number);
            let mgi_acc_id = mgi_id.acc_id.clone();
            accessions.write_row(&accession_row(
                acc_key,
                mgi_id,
                MGI_LOGICAL_DB,
                image_key,
                false,
                user_key,
                &date,
            ))?;
            accessions.write_row(&accession_row(
                acc_key + 1,
                ImageAccessionId::new(PIX_PREFIX, pix_id),
                PIX_LOGICAL_DB,
                image_key,
                true,
                user_key,
                &date,
            ))?;

            if let Some(note) = record.text("copyright").filter(|n| !n.is_empty()) {
                copyrights.write_row(&[mgi_acc_id.as_str(), note])?;
            }
            if let Some(note) = record.text("caption").filter(|n| !n.is_empty()) {
                captions.write_row(&[mgi_acc_id.as_str(), note])?;
            }

            image_keys.insert(pix_id.to_string(), image_key);
            image_key += 1;
            acc_key += 2;
            mgi_number += 1;
        }

        sink.event(phase("Transform", format!("{} panes", pane_lines.records.len())));
        for record in &pane_lines.records {
            let pix_id = record.text("pix_id").unwrap_or_default();
            let Some(owner) = image_keys.get(pix_id) else {
                errors.line(format_args!(
                    "Cannot Find Image ({}): {pix_id}",
                    record.line_number
                ))?;
                summary.unresolved += 1;
                continue;
            };
            panes.write_row(&[
                pane_key.to_string(),
                owner.to_string(),
                record.text("label").unwrap_or_default().to_string(),
                date.clone(),
                date.clone(),
            ])?;
            pane_key += 1;
        }

        summary.rows_written = images.rows() + panes.rows();
        sink.event(phase(
            "Store",
            format!("{} images, {} panes", images.rows(), panes.rows()),
        ));
        let image_output = images.finish()?;
        let pane_output = panes.finish()?;
        let accession_output = accessions.finish()?;
        summary.outputs = vec![
            image_output.to_string(),
            pane_output.to_string(),
            accession_output.to_string(),
            copyrights.finish()?.to_string(),
            captions.finish()?.to_string(),
        ];

        let assigned = mgi_number - first_mgi_number;
        summary.loads = self.publish_batches(
            &[
                (IMAGE_TABLE, image_output.as_path()),
                (IMAGE_PANE_TABLE, pane_output.as_path()),
                (ACCESSION_TABLE, accession_output.as_path()),
            ],
            &[
                format!("exec ACC_setMax {assigned}"),
                format!("update statistics {IMAGE_TABLE}"),
                format!("update statistics {IMAGE_PANE_TABLE}"),
            ],
            sink,
        )?;
        Ok(summary)
    }

    /// Bulk loads `rows` into `table` and refreshes its statistics.
    fn publish(
        &self,
        table: &str,
        rows: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<LoadSummary>, GxdError> {
        self.publish_batches(
            &[(table, rows)],
            &[format!("update statistics {table}")],
            sink,
        )
    }

    /// Bulk loads each file into its table, then runs `statements` in order.
    /// Preview mode touches neither the loader nor the store.
    fn publish_batches(
        &self,
        batches: &[(&str, &Utf8Path)],
        statements: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<LoadSummary>, GxdError> {
        if !self.mode.submits() {
            for (table, rows) in batches {
                info!(%table, file = %rows, "preview mode; skipping bulk load");
            }
            return Ok(Vec::new());
        }
        let mut loads = Vec::with_capacity(batches.len());
        for &(table, rows) in batches {
            sink.event(phase("Load", format!("{table} <- {rows}")));
            let start = Instant::now();
            let records = self.loader.submit_batch(table, rows)?;
            sink.event(ProgressEvent {
                message: format!("bcp.done table={table} records={}", records.0),
                elapsed: Some(start.elapsed()),
            });
            loads.push(LoadSummary {
                table: table.to_string(),
                file: rows.to_string(),
                records,
            });
        }
        for statement in statements {
            self.loader.run_statement(statement)?;
        }
        Ok(loads)
    }

    fn finish_assoc(
        &self,
        writer: TsvWriter,
        mut summary: RunSummary,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GxdError> {
        summary.rows_written = writer.rows();
        sink.event(phase("Store", format!("{} association rows", writer.rows())));
        let output = writer.finish()?;
        summary.outputs.push(output.to_string());
        summary.loads = self.publish(ASSOC_TABLE, &output, sink)?;
        Ok(summary)
    }

    fn caption_for(
        &self,
        record: &Record,
        job: &PrepJob,
        probe_counts: &mut HashMap<String, usize>,
    ) -> Result<String, GxdError> {
        let (Some(note), Some(marker)) = (
            job.multi_probe_note.as_ref(),
            record.text("marker").filter(|m| !m.is_empty()),
        ) else {
            return Ok(job.caption.clone());
        };
        let count = match probe_counts.get(marker) {
            Some(count) => *count,
            None => {
                let count = self.store.marker_probe_count(marker)?;
                probe_counts.insert(marker.to_string(), count);
                count
            }
        };
        Ok(if count > 1 {
            note.clone()
        } else {
            job.caption.clone()
        })
    }

    fn user_key(&self, login: Option<&str>) -> Result<i64, GxdError> {
        let login = login.ok_or(GxdError::MissingArgument("created-by (CREATEDBY)"))?;
        self.store
            .user_key(login)?
            .ok_or_else(|| GxdError::UserNotFound(login.to_string()))
    }

    fn reference_key(&self, jnumber: &JNumber) -> Result<i64, GxdError> {
        self.store
            .reference_key(jnumber)?
            .ok_or_else(|| GxdError::ReferenceNotFound(jnumber.to_string()))
    }

    fn decode_file(
        &self,
        path: &Utf8Path,
        schema: &RecordSchema,
        sink: &dyn ProgressSink,
    ) -> Result<Decoded, GxdError> {
        sink.event(phase("Read", path.to_string()));
        let lines = fs_util::read_lines(path)?;
        let mut records = Vec::with_capacity(lines.len());
        let mut skipped = 0;
        for (index, line) in lines.iter().enumerate() {
            if schema.header && index == 0 {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let line_number = index + 1;
            match schema.decode(line_number, line) {
                Ok(record) => records.push(record),
                Err(err) => match self.malformed {
                    MalformedPolicy::Skip => {
                        warn!(
                            %path,
                            line = line_number,
                            %err,
                            content = ?line,
                            "skipping malformed line"
                        );
                        skipped += 1;
                    }
                    MalformedPolicy::Fail => {
                        return Err(GxdError::MalformedLine {
                            path: path.to_path_buf(),
                            line: line_number,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }
        Ok(Decoded { records, skipped })
    }

    fn summary(&self, operation: &str) -> RunSummary {
        RunSummary {
            operation: operation.to_string(),
            mode: self.mode.to_string(),
            records_read: 0,
            rows_written: 0,
            skipped: 0,
            unresolved: 0,
            outputs: Vec::new(),
            loads: Vec::new(),
        }
    }
}

fn write_associations(
    writer: &mut TsvWriter,
    results: &[ResultKey],
    pane: ImagePaneKey,
    date: NaiveDate,
) -> Result<(), GxdError> {
    for result in results {
        writer.write_row(&AssociationRecord::new(*result, pane, date).fields())?;
    }
    Ok(())
}

/// One `ACC_Accession` row for an image.
fn accession_row(
    acc_key: i64,
    acc: ImageAccessionId,
    logical_db: i64,
    image_key: i64,
    private: bool,
    user_key: i64,
    date: &str,
) -> [String; 13] {
    [
        acc_key.to_string(),
        acc.acc_id,
        acc.prefix_part,
        acc.numeric_part,
        logical_db.to_string(),
        image_key.to_string(),
        IMAGE_MGITYPE_KEY.to_string(),
        if private { "1" } else { "0" }.to_string(),
        ACC_PREFERRED.to_string(),
        user_key.to_string(),
        user_key.to_string(),
        date.to_string(),
        date.to_string(),
    ]
}

fn phase(name: &str, detail: String) -> ProgressEvent {
    ProgressEvent {
        message: format!("phase={name}; {detail}"),
        elapsed: None,
    }
}
