use std::ops::Neg;
use std::sync::Arc;
use anyhow::Error;
use image::imageops::{self, FilterType};
use image::RgbImage;
use log::{debug, warn};
use ndarray::{Array1, Array3, Array4, Axis};
use crate::config::config::FaceIDConfig;
use crate::helper::face_helper::AlignedFace;
use crate::utils::utils::{f32_vec_to_u8, u8_to_f32_vec};

/// Contract of the face embedding model.
///
/// The input is a `1x3xHxW` normalized tensor. `Ok(None)` means the model
/// found no face in it.
pub trait EmbeddingModel: Send + Sync {
    fn infer(&self, tensor: &Array4<f32>) -> Result<Option<Vec<f32>>, Error>;
}

/// Identity feature vector of one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Array1<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding(Array1::from(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &Array1<f32> {
        &self.0
    }

    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice().unwrap_or(&[])
    }

    /// to_bytes serializes the vector as little-endian f32.
    pub fn to_bytes(&self) -> Vec<u8> {
        f32_vec_to_u8(&self.0.to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Embedding::new(u8_to_f32_vec(bytes)?))
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt()
    }
}

impl Neg for Embedding {
    type Output = Embedding;

    fn neg(self) -> Self::Output {
        Embedding(-self.0)
    }
}

#[derive(Clone)]
pub struct FaceIDClient {
    model: Arc<dyn EmbeddingModel>,
    pub model_name: String,
    pub mean: f32,
    pub scale: f32,
    pub imsize: (u32, u32),
    pub embedding_size: usize,
}

impl FaceIDClient {
    pub fn new(model: Arc<dyn EmbeddingModel>, config: FaceIDConfig) -> Self {
        FaceIDClient {
            model,
            model_name: config.model_name,
            mean: config.mean,
            scale: config.scale,
            imsize: config.imsize,
            embedding_size: config.embedding_size,
        }
    }

    /// preprocess resizes the face to the model input size and lays it out as
    /// a normalized `1x3xHxW` tensor.
    pub fn preprocess(&self, face: &RgbImage) -> Array4<f32> {
        let (width, height) = self.imsize;
        let resized = imageops::resize(face, width, height, FilterType::Triangle);

        let mut im_tensor = Array3::<f32>::zeros((height as usize, width as usize, 3usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for i in 0..3 {
                im_tensor[[y as usize, x as usize, i]] = (pixel[i] as f32 - self.mean) * self.scale;
            }
        }
        im_tensor.permuted_axes([2, 0, 1]).insert_axis(Axis(0))
    }

    /// embed computes the identity embedding of an aligned face.
    ///
    /// # Arguments
    /// * `aligned` - output of the face aligner
    ///
    /// # Returns
    /// * `Result<Option<Embedding>, Error>` - `None` when the model found no face
    pub fn embed(&self, aligned: &AlignedFace) -> Result<Option<Embedding>, Error> {
        let tensor = self.preprocess(aligned.image());
        let values = match self.model.infer(&tensor)? {
            None => {
                warn!("{} found no face in the aligned crop", self.model_name);
                return Ok(None)
            }
            Some(values) => values,
        };

        if values.is_empty() {
            return Err(Error::msg("face_id_client - embedding is empty"))
        }
        if self.embedding_size != 0 && values.len() != self.embedding_size {
            return Err(Error::msg(format!(
                "face_id_client - expected embedding of size {}, got {}", self.embedding_size, values.len()
            )))
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::msg("face_id_client - embedding contains non-finite values"))
        }

        let embedding = Embedding::new(values);
        if embedding.norm() == 0.0 {
            return Err(Error::msg("face_id_client - embedding has zero norm"))
        }
        debug!("{} produced embedding of size {}", self.model_name, embedding.len());
        Ok(Some(embedding))
    }
}
