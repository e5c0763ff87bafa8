mod uid;

pub use uid::uid;
