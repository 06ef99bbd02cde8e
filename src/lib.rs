mod utils;
pub mod args;
pub mod common;
pub mod data;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod segmentation_processing;
pub mod segmentation_runners;
pub mod visualizer;

use std::sync::Arc;

use crate::common::EvalConfig;
use crate::data::ImageTransform;
use crate::dataset::{Loader, ValDataset};
use crate::evaluation::{evaluate, EvalOptions, EvalSummary};
use crate::segmentation_runners::{InferenceProcess, SegmentationModule};

pub use crate::error::EvalError;

/// Load every network component of `config` onto its execution provider.
pub fn init_segmentation_module(config: &EvalConfig) -> anyhow::Result<SegmentationModule> {
    log::info!(
        "Initializing {} on the {} execution provider",
        config.arch.name(),
        config.device
    );
    SegmentationModule::new(config)
}

/// Open the validation manifest and start the prefetching loader.
pub fn init_loader(config: &EvalConfig) -> anyhow::Result<Loader> {
    let transform = ImageTransform::new(&config.img_sizes, config.img_max_size, config.padding_constant);
    let dataset = ValDataset::new(
        &config.list_val,
        &config.root_dataset,
        config.num_val,
        transform,
        config.label_offset,
    )?;
    Loader::new(Arc::new(dataset), config.num_workers)
}

/// Build the network and the loader, then evaluate the whole split.
pub fn run_evaluation(config: &EvalConfig) -> anyhow::Result<EvalSummary> {
    let mut module = init_segmentation_module(config)?;
    let loader = init_loader(config)?;
    let options = EvalOptions::from(config).with_total(loader.len());

    let summary = evaluate(&mut module, loader, &options)?;
    module.print_time();
    Ok(summary)
}
