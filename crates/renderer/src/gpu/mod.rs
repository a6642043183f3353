//! wgpu implementation of the GPU device collaborator.
//!
//! - `context` owns the wgpu instance/device/surface wiring and rebuilds the
//!   swap-chain when the window resizes.
//! - `pipeline` creates shader modules from byte blobs and links a vertex and
//!   pixel module into a render pipeline sharing one uniform layout.
//! - `uniforms` mirrors the shader parameter block and the rectangle vertices.
//! - `backend` glues everything together behind [`crate::surface::GpuBackend`].

mod backend;
mod context;
mod pipeline;
mod uniforms;

pub use backend::WgpuBackend;
pub use pipeline::WgpuProgramFactory;
