//! # maskchan
//!
//! maskchan is the alignment board texture builder, written in Rust. It takes the neuron
//! fragments, compartments and reference channels of an alignment board, each stored as a
//! legacy .mask/.chan file pair, and composites them into the textures used by the volume
//! renderer: a 16-bit mask texture, an interleaved channel texture and a color mapping table.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! HDF5 output is optional and off by default. To enable it, HDF5 must be installed and
//! maskchan built with the `hdf5` feature. If the HDF5 install is not auto detected, write
//! the following snippet into the file `.cargo/config.toml` in the maskchan repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./maskchan_cli` from the top level
//! maskchan repository (add `--features hdf5` for HDF5 output).
//!
//! ## Configuration
//!
//! A configuration is a YAML file:
//!
//! ```yml
//! board_path: /path/to/board.yml
//! output_path: /path/to/output/
//! data_root: /path/to/data/
//! cache_path: null
//! delete_cached: false
//! slab_count: 8
//! axial_divisibility: 4
//! max_volume_bytes: null
//! use_channel_data: true
//! intensity_divisor: 1
//! downsample_rate: 1
//! min_fragment_voxels: null
//! max_fragments: null
//! background_color: null
//! write_hdf5: false
//! ```
//!
//! - `data_root`: relative file names on the board are resolved against it.
//! - `cache_path`: when set, every file is first copied into this local directory, which is
//! removed after the build if `delete_cached` is true.
//! - `slab_count`: number of slabs each texture volume is split into.
//! - `axial_divisibility`: every texture axis is padded up to a multiple of this.
//! - `max_volume_bytes`: the build aborts before loading anything if the textures would be
//! larger.
//! - `min_fragment_voxels`/`max_fragments`: drop small fragments and cap the fragment count.
//! Compartments are never dropped.
//!
//! The board describes the items to composite:
//!
//! ```yml
//! name: my board
//! items:
//!   - name: sample
//!     kind: sample
//!   - name: fragment 1
//!     id: 1001
//!     kind: neuron_fragment
//!     mask_number: 1
//!     color: "ff8000"
//!     visible: true
//!     pass_through: false
//!     mask: sample/fragment_1.mask
//!     chan: sample/fragment_1.chan
//! ```
//!
//! Items with a mask file are painted with mask numbers 1, 2, 3... in board order. Items
//! without a color get one from a fixed palette.
//!
//! ## Output
//!
//! ```text
//! output/
//! |---- mask_texture.raw     u16 little-endian per voxel, x fastest, padded dims
//! |---- channel_texture.raw  channel_count bytes per voxel, padded dims
//! |---- color_mapping.raw    r, g, b, render method for each mask number
//! |---- board_texture.yml    dims, coverage, composites, dropped items, channel averages
//! |---- board_texture.h5     (hdf5 feature only)
//! ```
//!
//! Where fragments overlap the mask texture holds a composite id. The color of a composite is
//! the color of its dominant member, the first (largest) fragment painted there.
pub mod acceptor;
pub mod assembler;
pub mod board;
pub mod chan_file;
pub mod channel_builder;
pub mod channel_meta;
pub mod config;
pub mod constants;
pub mod downsample;
pub mod error;
pub mod export;
#[cfg(feature = "hdf5")]
pub mod hdf_writer;
pub mod large_volume;
pub mod loader;
pub mod mask_builder;
pub mod mask_file;
pub mod multi_mask;
pub mod process;
pub mod render_mapping;
pub mod renderable;
pub mod resolver;
pub mod texture;
pub mod voxel;
pub mod worker_status;
pub mod writer;
