//! TensorFlow frozen graph backends.

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Array4};
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use tracing::{debug, info};

use crate::config::{DetectorConfig, ModelsConfig};
use crate::crop::BoundingBox;
use crate::error::{LprError, LprResult};
use crate::recognizer::{Detector, LogitModel};

/// An imported `.pb` graph with its session.
pub struct FrozenGraph {
    graph: Graph,
    session: Mutex<Session>,
}

impl FrozenGraph {
    pub fn load(pb_file: impl AsRef<Path>) -> LprResult<Self> {
        let pb_path = pb_file.as_ref();
        let mut pb_file = File::open(pb_path)?;
        let mut pb = Vec::new();
        pb_file.read_to_end(&mut pb)?;
        // import graph def
        let mut graph = Graph::new();
        graph.import_graph_def(&pb, &ImportGraphDefOptions::new())?;
        let session = Session::new(&SessionOptions::new(), &graph)?;
        info!("loaded graph {}", pb_path.display());
        Ok(Self {
            graph,
            session: Mutex::new(session),
        })
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Object detection graph, `image_tensor` in, normalized boxes and scores out.
pub struct TfDetector {
    graph: FrozenGraph,
    input_name: String,
    boxes_name: String,
    scores_name: String,
    score_threshold: f32,
}

impl TfDetector {
    pub fn new(models: &ModelsConfig, detector: &DetectorConfig) -> LprResult<Self> {
        Ok(Self {
            graph: FrozenGraph::load(&models.detection)?,
            input_name: models.detection_input.clone(),
            boxes_name: models.detection_boxes.clone(),
            scores_name: models.detection_scores.clone(),
            score_threshold: detector.score_threshold,
        })
    }

    /// Raw boxes (`ymin, xmin, ymax, xmax`) and scores
    fn run(&self, input: &Tensor<u8>) -> LprResult<(Tensor<f32>, Tensor<f32>)> {
        let graph = &self.graph.graph;
        let mut args = SessionRunArgs::new();
        args.add_feed(&graph.operation_by_name_required(&self.input_name)?, 0, input);
        let box_token = args.request_fetch(&graph.operation_by_name_required(&self.boxes_name)?, 0);
        let scores_token = args.request_fetch(&graph.operation_by_name_required(&self.scores_name)?, 0);
        self.graph.session().run(&mut args)?;
        let boxes: Tensor<f32> = args.fetch(box_token)?;
        let scores: Tensor<f32> = args.fetch(scores_token)?;
        Ok((boxes, scores))
    }
}

impl Detector for TfDetector {
    fn detect(&self, image: &DynamicImage) -> LprResult<Vec<BoundingBox>> {
        let (width, height) = image.dimensions();
        let img_data = image.to_rgb8().into_raw();
        let img_tensor = Tensor::new(&[1, height as u64, width as u64, 3]).with_values(&img_data)?;

        let (boxes, scores) = self.run(&img_tensor)?;
        let detected: Vec<BoundingBox> = boxes
            .chunks_exact(4)
            .zip(scores.iter())
            .filter(|(_, score)| **score >= self.score_threshold)
            .map(|(v, _)| BoundingBox::from_normalized(v, width, height))
            .collect();
        debug!("{} of {} boxes above {}", detected.len(), scores.len(), self.score_threshold);
        Ok(detected)
    }
}

/// Recognition graph producing `[1, T, C]` class scores.
pub struct TfLogitModel {
    graph: FrozenGraph,
    input_name: String,
    output_name: String,
}

impl TfLogitModel {
    pub fn new(models: &ModelsConfig) -> LprResult<Self> {
        Ok(Self {
            graph: FrozenGraph::load(&models.recognition)?,
            input_name: models.recognition_input.clone(),
            output_name: models.recognition_output.clone(),
        })
    }
}

impl LogitModel for TfLogitModel {
    fn infer(&self, input: &Array4<f32>) -> LprResult<Array3<f32>> {
        let dims: Vec<u64> = input.shape().iter().map(|d| *d as u64).collect();
        let values: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::new(&dims).with_values(&values)?;

        let graph = &self.graph.graph;
        let mut args = SessionRunArgs::new();
        args.add_feed(&graph.operation_by_name_required(&self.input_name)?, 0, &tensor);
        let token = args.request_fetch(&graph.operation_by_name_required(&self.output_name)?, 0);
        self.graph.session().run(&mut args)?;
        let res: Tensor<f32> = args.fetch(token)?;

        let shape = match res.dims() {
            [b, t, c] => (*b as usize, *t as usize, *c as usize),
            [t, c] => (1, *t as usize, *c as usize),
            other => return Err(LprError::Shape(format!("recognizer output {:?}", other))),
        };
        Ok(Array3::from_shape_vec(shape, res.to_vec())?)
    }
}
