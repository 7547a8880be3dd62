mod client;
mod locator;
mod model;
pub mod upload;

pub use client::{
    ApiErrorClass, DEFAULT_BASE_URL, DriveClient, DriveError, SIMPLE_UPLOAD_LIMIT,
    SimpleUploadTarget,
};
pub use locator::{DriveTarget, DriveTargetError, ItemLocator, ODataQuery};
pub use model::{
    ConflictBehavior, DeletedFacet, DeltaPage, DriveItem, FileFacet, FileSystemInfo, FolderFacet,
    Hashes, ItemCollection, ItemReference, PreviewLinks, PreviewOptions, Thumbnail, ThumbnailSet,
    ThumbnailSetCollection, UploadSessionInfo,
};
pub use upload::{UploadConfig, UploadError, UploadReport, UploadSession};
