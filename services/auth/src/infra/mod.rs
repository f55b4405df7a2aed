pub mod db;
pub mod dispatch;
pub mod sweeper;
