pub mod replay_null;
pub mod replayer;

pub use replay_null::{NullReplayer, NullSink};
pub use replayer::{CommandReplayer, Replayer};
