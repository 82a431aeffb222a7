/// The block device provisioning abstraction.
mod block_device;
/// debugfs-backed raw inode access.
mod debugfs;
/// The raw inode metadata abstraction.
mod inode_editor;
/// Loop-device-backed ext4 images.
mod loop_device;
/// Struct-backed images.
mod structure;

pub use block_device::*;
pub use debugfs::*;
pub use inode_editor::*;
pub use loop_device::*;
pub use structure::*;
