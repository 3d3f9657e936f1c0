//! Recording catalog
//!
//! The list of uploaded recordings, its refresh trigger and card presentation.

pub mod card;
pub mod refresh;
pub mod view;

pub use card::RecordingCard;
pub use refresh::RefreshTrigger;
pub use view::{
    CatalogError, CatalogResult, CatalogStatus, CatalogView, DeleteJob, Prompt,
    DELETE_CONFIRMATION, DELETE_FAILED, FETCH_FAILED,
};
