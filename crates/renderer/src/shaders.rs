//! Shader load pipeline.
//!
//! A batch of [`LoadRequest`]s is turned into a [`ShaderTable`] by creating
//! every program concurrently on the rayon pool and joining on all of them.
//! Slot indices are assigned per stage in submission order before any work is
//! dispatched, so "vertex 0" always names the first vertex request no matter
//! which request finishes first. A batch either loads completely or fails as a
//! whole.

use std::borrow::Cow;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::types::ShaderStage;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// A single rejected shader blob.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("shader source is empty")]
    Empty,
    #[error("SPIR-V length {0} is not a multiple of four bytes")]
    Misaligned(usize),
    #[error("shader source is neither SPIR-V nor UTF-8 WGSL")]
    UnknownFormat,
    #[error("GPU rejected shader: {0}")]
    Rejected(String),
}

/// Failure of a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("shader batch is empty")]
    EmptyBatch,
    #[error("{stage} shader {index} failed to load ({failed} failed in batch)")]
    Program {
        stage: ShaderStage,
        index: usize,
        failed: usize,
        #[source]
        source: ProgramError,
    },
    #[error("shader load worker exited before reporting a result")]
    WorkerLost,
}

/// Encoding of a shader blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderFormat {
    SpirV,
    Wgsl,
}

impl ShaderFormat {
    /// Sniffs the blob: SPIR-V by its magic word, otherwise UTF-8 WGSL text.
    pub fn detect(bytes: &[u8]) -> Result<Self, ProgramError> {
        if bytes.is_empty() {
            return Err(ProgramError::Empty);
        }
        if bytes.len() >= 4 {
            let head = [bytes[0], bytes[1], bytes[2], bytes[3]];
            if u32::from_le_bytes(head) == SPIRV_MAGIC || u32::from_be_bytes(head) == SPIRV_MAGIC {
                if bytes.len() % 4 != 0 {
                    return Err(ProgramError::Misaligned(bytes.len()));
                }
                return Ok(ShaderFormat::SpirV);
            }
        }
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => Ok(ShaderFormat::Wgsl),
            Ok(_) => Err(ProgramError::Empty),
            Err(_) => Err(ProgramError::UnknownFormat),
        }
    }
}

/// Decodes a SPIR-V blob into native-endian words, honouring the byte order
/// announced by its magic word.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, ProgramError> {
    if bytes.len() % 4 != 0 {
        return Err(ProgramError::Misaligned(bytes.len()));
    }
    let little = bytes.len() >= 4
        && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == SPIRV_MAGIC;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let word = [chunk[0], chunk[1], chunk[2], chunk[3]];
            if little {
                u32::from_le_bytes(word)
            } else {
                u32::from_be_bytes(word)
            }
        })
        .collect())
}

/// One shader blob to load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub stage: ShaderStage,
    pub source: Cow<'static, [u8]>,
}

impl LoadRequest {
    pub fn new(stage: ShaderStage, source: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Address of a loaded program: stage plus per-stage submission ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    pub stage: ShaderStage,
    pub index: usize,
}

/// Creates GPU program objects from byte blobs.
///
/// Implementations are shared across the loader's worker threads, so creation
/// must only touch the object it returns.
pub trait ProgramFactory: Send + Sync + 'static {
    type Program: Send + 'static;

    fn create_program(
        &self,
        stage: ShaderStage,
        source: &[u8],
    ) -> Result<Self::Program, ProgramError>;
}

/// Loaded programs, keyed by stage and submission index.
#[derive(Debug)]
pub struct ShaderTable<P> {
    vertex: Vec<P>,
    pixel: Vec<P>,
}

impl<P> ShaderTable<P> {
    fn with_capacity(vertex: usize, pixel: usize) -> Self {
        Self {
            vertex: Vec::with_capacity(vertex),
            pixel: Vec::with_capacity(pixel),
        }
    }

    fn stage(&self, stage: ShaderStage) -> &Vec<P> {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Pixel => &self.pixel,
        }
    }

    fn push(&mut self, address: SlotAddress, program: P) {
        let slots = match address.stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
        };
        debug_assert_eq!(slots.len(), address.index, "slots must be filled in order");
        slots.push(program);
    }

    /// Program at `index` within `stage`, in submission order.
    pub fn get(&self, stage: ShaderStage, index: usize) -> Option<&P> {
        self.stage(stage).get(index)
    }

    /// Number of programs loaded for `stage`.
    pub fn count(&self, stage: ShaderStage) -> usize {
        self.stage(stage).len()
    }

    /// Programs across both stages.
    pub fn len(&self) -> usize {
        self.vertex.len() + self.pixel.len()
    }

    /// True when neither stage loaded a program.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assigns `(stage, index)` addresses in submission order.
pub fn assign_slots(requests: &[LoadRequest]) -> Vec<SlotAddress> {
    let mut vertex = 0;
    let mut pixel = 0;
    requests
        .iter()
        .map(|request| {
            let counter = match request.stage {
                ShaderStage::Vertex => &mut vertex,
                ShaderStage::Pixel => &mut pixel,
            };
            let address = SlotAddress {
                stage: request.stage,
                index: *counter,
            };
            *counter += 1;
            address
        })
        .collect()
}

/// Loads every request concurrently and returns once all of them finished.
pub fn load_batch<F>(
    factory: &F,
    requests: &[LoadRequest],
) -> Result<ShaderTable<F::Program>, LoadError>
where
    F: ProgramFactory,
{
    if requests.is_empty() {
        return Err(LoadError::EmptyBatch);
    }

    let addresses = assign_slots(requests);
    let results: Vec<Result<F::Program, ProgramError>> = requests
        .par_iter()
        .zip(addresses.par_iter())
        .map(|(request, address)| {
            debug!(
                stage = %address.stage,
                index = address.index,
                bytes = request.source.len(),
                "creating shader program"
            );
            factory.create_program(request.stage, &request.source)
        })
        .collect();

    let vertex_count = addresses
        .iter()
        .filter(|address| address.stage == ShaderStage::Vertex)
        .count();
    let mut table = ShaderTable::with_capacity(vertex_count, addresses.len() - vertex_count);
    let mut first_failure = None;
    let mut failed = 0;
    for (address, result) in addresses.into_iter().zip(results) {
        match result {
            Ok(program) if first_failure.is_none() => table.push(address, program),
            Ok(_) => {}
            Err(err) => {
                warn!(stage = %address.stage, index = address.index, error = %err, "shader program rejected");
                failed += 1;
                first_failure.get_or_insert((address, err));
            }
        }
    }

    match first_failure {
        Some((address, source)) => Err(LoadError::Program {
            stage: address.stage,
            index: address.index,
            failed,
            source,
        }),
        None => {
            debug!(
                vertex = table.count(ShaderStage::Vertex),
                pixel = table.count(ShaderStage::Pixel),
                "shader batch loaded"
            );
            Ok(table)
        }
    }
}

/// Starts loading on a worker thread and returns immediately.
///
/// The returned [`PendingLoad`] already knows every slot address; the table
/// itself becomes available once the worker joins on the whole batch.
pub fn load_batch_background<F>(factory: F, requests: Vec<LoadRequest>) -> PendingLoad<F::Program>
where
    F: ProgramFactory,
{
    let addresses = assign_slots(&requests);
    let (sender, receiver) = bounded(1);
    let spawned = thread::Builder::new()
        .name("oledsaver-shader-load".into())
        .spawn(move || {
            let _ = sender.send(load_batch(&factory, &requests));
        });
    if let Err(err) = spawned {
        warn!(error = %err, "failed to spawn shader load worker");
    }
    PendingLoad {
        addresses,
        receiver,
    }
}

/// Handle to a batch loading in the background.
pub struct PendingLoad<P> {
    addresses: Vec<SlotAddress>,
    receiver: Receiver<Result<ShaderTable<P>, LoadError>>,
}

impl<P> PendingLoad<P> {
    /// Addresses of the submitted requests, valid before loading completes.
    pub fn slots(&self) -> &[SlotAddress] {
        &self.addresses
    }

    /// Returns the table if the batch has finished, `None` while it is still loading.
    pub fn try_complete(&self) -> Result<Option<ShaderTable<P>>, LoadError> {
        match self.receiver.try_recv() {
            Ok(result) => result.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LoadError::WorkerLost),
        }
    }

    /// Blocks until the whole batch has finished.
    pub fn wait(self) -> Result<ShaderTable<P>, LoadError> {
        self.receiver.recv().map_err(|_| LoadError::WorkerLost)?
    }
}
