//! Contract of the audio-extraction service.

pub mod pb {
    tonic::include_proto!("audiostripper.v1");
}

pub use pb::audio_stripper_client::AudioStripperClient;
pub use pb::audio_stripper_server::{AudioStripper, AudioStripperServer};
