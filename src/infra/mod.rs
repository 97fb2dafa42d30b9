// Adapters behind the application ports

pub mod csv_export;
pub mod sms_http;

pub use csv_export::{write_contacts_file, CsvContactWriter};
pub use sms_http::SmsHttpNotifier;
