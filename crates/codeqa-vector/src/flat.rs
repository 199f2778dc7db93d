//! Exact inner-product search over a dense matrix.
//!
//! Vectors are stored row-major in one contiguous buffer. Search scores
//! every row, which is exact and fast enough for a single corpus snapshot.
//!
//! # File format
//!
//! ```text
//! magic      8 bytes   "CQFLAT01"
//! dimension  u32 LE
//! rows       u64 LE
//! data       rows * dimension f32 LE
//! checksum   32 bytes  blake3 of everything above
//! ```

use std::cmp::Ordering;
use std::path::Path;

use codeqa_core::util::files::{read_artifact, write_atomic};
use codeqa_core::{Error, Result};

const MAGIC: &[u8; 8] = b"CQFLAT01";
const HEADER_LEN: usize = 8 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

// ============================================================================
// EmbeddingMatrix
// ============================================================================

/// A row-major matrix of embedding vectors with a fixed dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dimension: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// An empty matrix of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build from rows, all of which must have length `dimension`.
    pub fn from_rows(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        let mut matrix = Self::new(dimension);
        matrix.data.reserve(rows.len() * dimension);
        for row in rows {
            matrix.push(&row)?;
        }
        Ok(matrix)
    }

    /// Append one row.
    pub fn push(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dimension {
            return Err(Error::invalid_data(format!(
                "Vector has dimension {}, expected {}",
                row.len(),
                self.dimension
            )));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Row `i`, if in bounds.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows() {
            return None;
        }
        let start = i * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Encode into the checksummed binary format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4 + CHECKSUM_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.rows() as u64).to_le_bytes());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        let checksum = blake3::hash(&out);
        out.extend_from_slice(checksum.as_bytes());
        out
    }

    /// Decode from the checksummed binary format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(Error::invalid_data("Matrix file is truncated"));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != checksum {
            return Err(Error::invalid_data("Matrix checksum mismatch"));
        }
        if &body[..8] != MAGIC {
            return Err(Error::invalid_data("Not a matrix file"));
        }

        let mut dim_bytes = [0u8; 4];
        dim_bytes.copy_from_slice(&body[8..12]);
        let dimension = u32::from_le_bytes(dim_bytes) as usize;

        let mut rows_bytes = [0u8; 8];
        rows_bytes.copy_from_slice(&body[12..20]);
        let rows = u64::from_le_bytes(rows_bytes) as usize;

        let payload = &body[HEADER_LEN..];
        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::invalid_data("Matrix header overflows"))?;
        if payload.len() != expected {
            return Err(Error::invalid_data(format!(
                "Matrix payload has {} bytes, header says {expected}",
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dimension, data })
    }

    /// Write to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes())
    }

    /// Read from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_artifact(path)?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// FlatIpIndex
// ============================================================================

/// Exact inner-product index; with unit vectors the score is cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    vectors: EmbeddingMatrix,
}

impl FlatIpIndex {
    /// An empty index of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: EmbeddingMatrix::new(dimension),
        }
    }

    /// Index the given vectors, in ordinal order.
    pub fn from_vectors(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        Ok(Self {
            vectors: EmbeddingMatrix::from_rows(dimension, vectors)?,
        })
    }

    /// Index an existing matrix.
    pub fn from_matrix(vectors: EmbeddingMatrix) -> Self {
        Self { vectors }
    }

    /// Append one vector; its ordinal is the previous length.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        self.vectors.push(vector)
    }

    /// Top `k` rows by inner product with `query` as `(ordinal, score)`.
    ///
    /// Ties keep ordinal order. Fails if `query` has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension() {
            return Err(Error::invalid_data(format!(
                "Query vector has dimension {}, index has {}",
                query.len(),
                self.dimension()
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter_rows()
            .enumerate()
            .map(|(ordinal, row)| (ordinal, dot(row, query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// The indexed vectors.
    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.vectors
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.rows()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Write to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.vectors.save(path)
    }

    /// Read from `path`; corrupt or truncated files are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            vectors: EmbeddingMatrix::load(path)?,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Tests
// ============================================================================
