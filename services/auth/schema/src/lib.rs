pub mod accounts;
pub mod otp_records;
pub mod sessions;
