//! `.odgt` validation manifests: one JSON object per line.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::common::{LabelMap, Sample};
use crate::data::ImageTransform;
use crate::error::EvalError;
use crate::utils::read_lines;

/// One manifest line. Paths are relative to the dataset root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdgtRecord {
    pub fpath_img: String,
    pub fpath_segm: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Parse every non-empty line of `path`.
pub fn parse_odgt<P: AsRef<Path>>(path: P) -> Result<Vec<OdgtRecord>> {
    let path = path.as_ref();
    let lines = read_lines(path).with_context(|| format!("failed to read {}", path.display()))?;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str::<OdgtRecord>(line)
                .with_context(|| format!("{}:{}: invalid manifest record", path.display(), i + 1))
        })
        .collect()
}

/// Decode a label image into class indices, minus `label_offset`.
///
/// Gray images are read as is; for color images the first channel holds the
/// class index. Palette images arrive here already expanded to colors, so
/// they go through [`load_label`] instead.
pub fn decode_label(segm: DynamicImage, label_offset: i32) -> Result<LabelMap> {
    let (w, h) = (segm.width() as usize, segm.height() as usize);
    let values: Vec<i32> = match segm {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(|v| v as i32 - label_offset).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(|v| v as i32 - label_offset).collect(),
        other => other.into_rgb8().pixels().map(|p| p[0] as i32 - label_offset).collect(),
    };
    Ok(LabelMap::from_shape_vec((h, w), values)?)
}

/// Palette indices of an indexed PNG, or `None` for any other color type.
pub fn read_palette_indices(path: &Path, label_offset: i32) -> Result<Option<LabelMap>> {
    let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    if reader.info().color_type != png::ColorType::Indexed {
        return Ok(None);
    }
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;

    let (w, h) = (frame.width as usize, frame.height as usize);
    let bits = frame.bit_depth as usize;
    let per_byte = 8 / bits;
    let mask = ((1u16 << bits) - 1) as u8;
    let mut values = Vec::with_capacity(w * h);
    for row in buf.chunks(frame.line_size).take(h) {
        for x in 0..w {
            let shift = 8 - bits * (x % per_byte + 1);
            let index = (row[x / per_byte] >> shift) & mask;
            values.push(index as i32 - label_offset);
        }
    }
    Ok(Some(LabelMap::from_shape_vec((h, w), values)?))
}

/// Read the label image at `path`, keeping palette indices of indexed PNGs.
pub fn load_label(path: &Path, label_offset: i32) -> Result<LabelMap> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if is_png {
        if let Some(labels) = read_palette_indices(path, label_offset)
            .with_context(|| format!("failed to decode label {}", path.display()))?
        {
            return Ok(labels);
        }
    }
    let segm = image::open(path).with_context(|| format!("failed to open label {}", path.display()))?;
    decode_label(segm, label_offset)
}

/// Validation split: manifest records plus the per-sample transform.
#[derive(Debug, Clone)]
pub struct ValDataset {
    root: PathBuf,
    records: Vec<OdgtRecord>,
    transform: ImageTransform,
    label_offset: i32,
}

impl ValDataset {
    /// Read `list_val`, keeping at most `max_sample` records.
    pub fn new(
        list_val: &Path,
        root: &Path,
        max_sample: Option<usize>,
        transform: ImageTransform,
        label_offset: i32,
    ) -> Result<Self> {
        let mut records = parse_odgt(list_val)?;
        if let Some(n) = max_sample {
            records.truncate(n);
        }
        log::info!("# samples: {}", records.len());
        Ok(Self::from_records(records, root, transform, label_offset))
    }

    pub fn from_records(
        records: Vec<OdgtRecord>,
        root: &Path,
        transform: ImageTransform,
        label_offset: i32,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            records,
            transform,
            label_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[OdgtRecord] {
        &self.records
    }

    /// Load, decode and resize sample `idx`.
    pub fn get(&self, idx: usize) -> Result<Sample> {
        let record = self
            .records
            .get(idx)
            .ok_or_else(|| anyhow::anyhow!("sample index {idx} out of range ({})", self.len()))?;
        let img_path = self.root.join(&record.fpath_img);
        let segm_path = self.root.join(&record.fpath_segm);

        let img = image::open(&img_path)
            .with_context(|| format!("failed to open image {}", img_path.display()))?
            .into_rgb8();
        let seg_label = load_label(&segm_path, self.label_offset)?;

        let (w, h) = img.dimensions();
        if seg_label.dim() != (h as usize, w as usize) {
            return Err(EvalError::malformed(
                &record.fpath_img,
                format!(
                    "image is {w}x{h} but label is {}x{}",
                    seg_label.ncols(),
                    seg_label.nrows()
                ),
            )
            .into());
        }
        if record.width > 0 && record.height > 0 && (record.width, record.height) != (w, h) {
            log::warn!(
                "{}: manifest says {}x{}, file is {}x{}",
                record.fpath_img,
                record.width,
                record.height,
                w,
                h
            );
        }

        let img_data = self.transform.apply(&img)?;
        Ok(Sample::new(img, seg_label, img_data, record.fpath_img.clone()))
    }
}
