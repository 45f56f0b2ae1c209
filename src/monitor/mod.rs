pub mod ring;

pub use ring::{MonitoringRing, MonitoringStats, PacketRecord};
