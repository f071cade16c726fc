//! Fixed GATT identifiers of the environmental sensor peripheral.

/// Primary service exposed by the sensor.
pub const SERVICE_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x133f_e8d4_5197_4675_9d76_d9bb_f245_0bb4);

/// Notify-only characteristic carrying the 8-byte reading frame.
pub const CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x0fc1_0cb8_0518_40dd_b5c3_c463_7815_de40);

/// Client Characteristic Configuration Descriptor (`0x2902`).
pub const CCCD_UUID: uuid::Uuid = uuid::Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// CCCD value requesting notifications (not indications).
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
