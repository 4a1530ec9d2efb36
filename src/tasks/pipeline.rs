use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error;
use crate::events::{ModelEpoch, PipelineRequest, ViewerCommand};
use crate::processing::mesh::Mesh;
use crate::processing::pipeline::SynthesisPipeline;

/// Runs synthesis requests off the render thread and installs each new mesh in the viewer.
/// Meshes carry the epoch of the last reset seen, so the viewer can drop ones it has outlived.
pub async fn run(
    mut requests: UnboundedReceiver<PipelineRequest>,
    to_viewer: UnboundedSender<ViewerCommand>,
    cancel: CancellationToken,
    pipeline: SynthesisPipeline,
) -> Result<()> {
    let mut pipeline = Some(pipeline);
    let mut epoch = ModelEpoch::default();

    loop {
        select! {
            _ = cancel.cancelled() => break,
            maybe_request = requests.recv() => {
                let Some(request) = maybe_request else {
                    break;
                };
                if let PipelineRequest::Reset(next) = &request {
                    epoch = *next;
                }
                let Some(mut current) = pipeline.take() else {
                    break;
                };
                let (returned, outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = handle(&mut current, request);
                    (current, outcome)
                })
                .await
                .context("synthesis worker panicked")?;
                pipeline = Some(returned);

                match outcome {
                    Ok(Some(mesh)) => {
                        let install = ViewerCommand::InstallModel { mesh, epoch };
                        if to_viewer.send(install).is_err() {
                            debug!("viewer gone; stopping pipeline task");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "synthesis request failed"),
                }
            }
        }
    }
    Ok(())
}

/// Applies one request. `Ok(None)` means there is nothing new to show.
pub fn handle(
    pipeline: &mut SynthesisPipeline,
    request: PipelineRequest,
) -> error::Result<Option<Arc<Mesh>>> {
    match request {
        PipelineRequest::SubmitImage(image) => pipeline.submit_image(image).map(Some),
        PipelineRequest::SetDepthScale(scale) => pipeline.set_depth_scale(scale),
        PipelineRequest::SetGridResolution(columns, rows) => {
            pipeline.set_grid_resolution(columns, rows)
        }
        PipelineRequest::NudgeDepthScale(delta) => {
            let scale = pipeline.options().depth_scale.get() + delta;
            debug!(scale, "depth scale adjusted");
            pipeline.set_depth_scale(scale)
        }
        PipelineRequest::ScaleGrid(factor) => {
            let grid = pipeline.options().grid.scaled(factor);
            debug!(columns = grid.columns(), rows = grid.rows(), "grid adjusted");
            pipeline.set_grid_resolution(grid.columns(), grid.rows())
        }
        PipelineRequest::Reset(_) => {
            pipeline.reset();
            Ok(None)
        }
    }
}
