use serde::{Deserialize, Serialize};

/// Distance function a dataset was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    L2,
    Cosine,
    Dot,
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
        }
    }
}

/// A single record handed to the uploader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    /// Records without a vector payload are skipped on upload
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl Record {
    pub fn new(id: u64, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector: Some(vector),
        }
    }
}

/// A nearest-neighbour query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub vector: Vec<f32>,
    /// Ground-truth neighbour ids, closest first (for precision)
    #[serde(default, alias = "expected")]
    pub neighbors: Option<Vec<u64>>,
}

impl Query {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            neighbors: None,
        }
    }
}

/// A single search hit, in backend ranking order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    /// Backend distance when requested, otherwise 0.0
    pub score: f32,
}

/// Options returned by the configurator that shape how vectors are prepared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Vectors must be L2-normalised before upload and search
    pub normalize: bool,
}

/// Scale `vector` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
