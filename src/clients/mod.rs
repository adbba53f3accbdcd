pub mod drive_client;
pub mod sheets_client;

pub use drive_client::DriveClient;
pub use sheets_client::SheetsClient;
