pub mod frame_ring_buffer;
pub mod pong_environment;
pub mod preprocessing;
