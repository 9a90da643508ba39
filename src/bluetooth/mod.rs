pub mod adapter;
pub mod bluez;
pub mod decode;
#[cfg(test)]
pub mod mock;
pub mod scan;

pub use adapter::{Advertisement, BleAdapter, BleCharacteristic, BleDevice, ConnectionEvent};
pub use bluez::BluezAdapter;
pub use decode::decode_sensor_payload;
pub use scan::{fresh_advertisements, Sighting};
