pub mod audio;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{ActivityIndicator, AudioCapture, floats_to_pcm16, is_active};

pub use realtime::{
    Collaborators, ConnectionState, DisplaySink, ItemRole, RealtimeClient, RealtimeError,
    RealtimeResult, SessionOptions,
};
