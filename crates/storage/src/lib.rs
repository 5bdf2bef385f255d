#![forbid(unsafe_code)]

mod db;
mod value;
mod waiters;

pub use db::Db;
