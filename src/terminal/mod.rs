mod bullet_points;
pub mod table;

pub use bullet_points::{BulletPointPrinter, LineWriter, StdoutLineWriter};

#[cfg(test)]
pub(crate) use bullet_points::testutils;
