//! State management module
//!
//! This module handles all application state, including:
//! - Shared data structures (data.rs)
//! - The contact list controller and its observable state (contacts.rs)
//! - The album store and its SQLite media index (gallery.rs, media_index.rs)
//! - Selection sets and bulk save/delete actions (selection.rs, batch.rs)

pub mod batch;
pub mod contacts;
pub mod data;
pub mod gallery;
pub mod media_index;
pub mod selection;

pub use batch::{delete_selected, save_selected, DeleteReport, SaveReport};
pub use contacts::ContactListController;
pub use data::{ContactRecord, LoadState, SavedImage, StorageLocation};
pub use gallery::GalleryStore;
pub use selection::Selection;
