//! Raw GGML Whisper model builder and parser shared by the integration tests
//!
//! Files are assembled byte by byte so the tests do not depend on the
//! library's own writer.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use half::f16;

pub const MAGIC: u32 = 0x6767_6d6c;
pub const TYPE_F32: i32 = 0;
pub const TYPE_F16: i32 = 1;
pub const TYPE_Q4_0: i32 = 2;
pub const TYPE_Q8_0: i32 = 8;
pub const TYPE_Q4_K: i32 = 12;

/// Byte offset of the `ftype` header field
pub const HPARAMS_FTYPE_OFFSET: usize = 4 + 10 * 4;

/// (elements per block, bytes per block) for the ids these tests touch
pub fn geometry(type_id: i32) -> (usize, usize) {
    match type_id {
        0 => (1, 4),
        1 => (1, 2),
        2 => (32, 18),
        3 => (32, 20),
        6 => (32, 22),
        7 => (32, 24),
        8 => (32, 34),
        10 => (256, 84),
        11 => (256, 110),
        12 => (256, 144),
        13 => (256, 176),
        14 => (256, 210),
        other => panic!("test geometry missing for type {other}"),
    }
}

pub fn payload_len(type_id: i32, extents: &[i32]) -> usize {
    let (epb, bpb) = geometry(type_id);
    let row = extents[0] as usize;
    let rest: usize = extents[1..].iter().map(|&e| e as usize).product();
    row.div_ceil(epb) * bpb * rest
}

/// Deterministic weights in roughly [-0.6, 0.6]
pub fn weights(n: usize, seed: u32) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = (i as f32 + seed as f32 * 17.0) * 0.37;
            0.5 * x.sin() + 0.1 * (x * 3.1).cos()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTensor {
    pub name: String,
    pub extents: Vec<i32>,
    pub type_id: i32,
    pub payload: Vec<u8>,
}

impl RawTensor {
    pub fn f16(name: &str, extents: &[i32], seed: u32) -> Self {
        let n: usize = extents.iter().map(|&e| e as usize).product();
        let payload = weights(n, seed)
            .into_iter()
            .flat_map(|v| f16::from_f32(v).to_le_bytes())
            .collect();
        Self {
            name: name.to_string(),
            extents: extents.to_vec(),
            type_id: TYPE_F16,
            payload,
        }
    }

    pub fn f32(name: &str, extents: &[i32], seed: u32) -> Self {
        let n: usize = extents.iter().map(|&e| e as usize).product();
        let payload = weights(n, seed)
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect();
        Self {
            name: name.to_string(),
            extents: extents.to_vec(),
            type_id: TYPE_F32,
            payload,
        }
    }

    /// Opaque payload of the right size for `type_id`
    pub fn opaque(name: &str, extents: &[i32], type_id: i32) -> Self {
        let len = payload_len(type_id, extents);
        Self {
            name: name.to_string(),
            extents: extents.to_vec(),
            type_id,
            payload: (0..len).map(|i| (i % 251) as u8).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.extents.len() as i32).to_le_bytes());
        buf.extend_from_slice(&(self.name.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.type_id.to_le_bytes());
        for e in &self.extents {
            buf.extend_from_slice(&e.to_le_bytes());
        }
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pub hparams: [i32; 11],
    pub n_mel: i32,
    pub n_fft: i32,
    pub vocab: Vec<Vec<u8>>,
    pub tensors: Vec<RawTensor>,
}

impl ModelBuilder {
    /// Header, mel filters and vocabulary of a small model, no tensors
    pub fn empty() -> Self {
        Self {
            hparams: [64, 16, 64, 2, 1, 16, 64, 2, 1, 8, 1],
            n_mel: 8,
            n_fft: 5,
            vocab: vec![b"!".to_vec(), b"hello".to_vec(), b"<|endoftext|>".to_vec()],
            tensors: Vec::new(),
        }
    }

    /// A Whisper-shaped model whose matrices are all 256 wide
    pub fn tiny() -> Self {
        Self::empty()
            .tensor(RawTensor::f32("encoder.positional_embedding", &[256, 4], 1))
            .tensor(RawTensor::f16("encoder.conv1.weight", &[3, 8, 256], 2))
            .tensor(RawTensor::f32("encoder.conv1.bias", &[1, 256], 3))
            .tensor(RawTensor::f16("encoder.blocks.0.attn.query.weight", &[256, 4], 4))
            .tensor(RawTensor::f32("encoder.blocks.0.attn.query.bias", &[256], 5))
            .tensor(RawTensor::f16("encoder.blocks.0.mlp.0.weight", &[256, 8], 6))
            .tensor(RawTensor::f16("decoder.token_embedding.weight", &[256, 8], 7))
            .tensor(RawTensor::f16("decoder.blocks.0.attn.key.weight", &[256, 4], 8))
            .tensor(RawTensor::f32("decoder.positional_embedding", &[256, 4], 9))
            .tensor(RawTensor::f32("decoder.ln.weight", &[256], 10))
    }

    pub fn tensor(mut self, tensor: RawTensor) -> Self {
        self.tensors.push(tensor);
        self
    }

    pub fn ftype(mut self, ftype: i32) -> Self {
        self.hparams[10] = ftype;
        self
    }

    /// Everything before the first tensor record
    pub fn prefix_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        for h in self.hparams {
            buf.extend_from_slice(&h.to_le_bytes());
        }
        buf.extend_from_slice(&self.n_mel.to_le_bytes());
        buf.extend_from_slice(&self.n_fft.to_le_bytes());
        for i in 0..self.n_mel * self.n_fft {
            buf.extend_from_slice(&(i as f32 * 0.01).to_le_bytes());
        }
        buf.extend_from_slice(&(self.vocab.len() as i32).to_le_bytes());
        for token in &self.vocab {
            buf.extend_from_slice(&(token.len() as u32).to_le_bytes());
            buf.extend_from_slice(token);
        }
        buf
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.prefix_bytes();
        for t in &self.tensors {
            buf.extend_from_slice(&t.to_bytes());
        }
        buf
    }

    pub fn write_to(&self, dir: &Path, file: &str) -> PathBuf {
        let path = dir.join(file);
        let mut f = std::fs::File::create(&path).expect("create model");
        f.write_all(&self.to_bytes()).expect("write model");
        path
    }
}

/// A written model split back into its parts
#[derive(Debug)]
pub struct ParsedModel {
    pub hparams: [i32; 11],
    pub prefix: Vec<u8>,
    pub tensors: Vec<RawTensor>,
}

impl ParsedModel {
    pub fn ftype(&self) -> i32 {
        self.hparams[10]
    }

    pub fn tensor(&self, name: &str) -> &RawTensor {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("no tensor {name}"))
    }
}

fn take_i32(bytes: &[u8], pos: &mut usize) -> i32 {
    let v = i32::from_le_bytes(bytes[*pos..*pos + 4].try_into().expect("4 bytes"));
    *pos += 4;
    v
}

pub fn parse_model(bytes: &[u8]) -> ParsedModel {
    let mut pos = 0;
    assert_eq!(take_i32(bytes, &mut pos) as u32, MAGIC);
    let mut hparams = [0i32; 11];
    for h in &mut hparams {
        *h = take_i32(bytes, &mut pos);
    }
    let n_mel = take_i32(bytes, &mut pos);
    let n_fft = take_i32(bytes, &mut pos);
    pos += (n_mel * n_fft) as usize * 4;
    let n_vocab = take_i32(bytes, &mut pos);
    for _ in 0..n_vocab {
        let len = take_i32(bytes, &mut pos) as usize;
        pos += len;
    }
    let prefix = bytes[..pos].to_vec();

    let mut tensors = Vec::new();
    while pos < bytes.len() {
        let rank = take_i32(bytes, &mut pos) as usize;
        let name_len = take_i32(bytes, &mut pos) as usize;
        let type_id = take_i32(bytes, &mut pos);
        let extents: Vec<i32> = (0..rank).map(|_| take_i32(bytes, &mut pos)).collect();
        let name = String::from_utf8(bytes[pos..pos + name_len].to_vec()).expect("utf8 name");
        pos += name_len;
        let len = payload_len(type_id, &extents);
        let payload = bytes[pos..pos + len].to_vec();
        pos += len;
        tensors.push(RawTensor {
            name,
            extents,
            type_id,
            payload,
        });
    }
    assert_eq!(pos, bytes.len(), "trailing bytes");

    ParsedModel {
        hparams,
        prefix,
        tensors,
    }
}

pub fn f16_values(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(2)
        .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
        .collect()
}

pub fn f32_values(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
