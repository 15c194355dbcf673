pub mod dmx;
