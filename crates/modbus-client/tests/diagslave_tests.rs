use modbus_client::ModbusClient;
use types::FunctionCode;

/// Exercises a real Modbus/TCP device (e.g. `diagslave`) when one is
/// configured; otherwise a no-op, mirroring the pack's pattern of skipping
/// live-device tests when no test server is present.
#[tokio::test]
async fn diagslave_integration_read() {
    let host = match std::env::var("MODBUS_TEST_HOST") {
        Ok(value) => value,
        Err(_) => return,
    };

    let port = env_u16("MODBUS_TEST_PORT").unwrap_or(1502);
    let unit_id = env_u16("MODBUS_TEST_UNIT_ID").unwrap_or(1) as u8;
    let start = env_u16("MODBUS_TEST_START").unwrap_or(0);
    let count = env_u16("MODBUS_TEST_COUNT").unwrap_or(8);

    let mut client = ModbusClient::connect(&host, port).await.expect("connect");
    client.set_timeout(env_u64("MODBUS_TEST_TIMEOUT_MS").unwrap_or(1_000));
    client.set_slave(unit_id).await;

    let payload = client
        .read(FunctionCode::HoldingRegisters, start, count)
        .await
        .expect("read");

    match payload {
        modbus_client::ReadPayload::Words(values) => assert_eq!(values.len() as u16, count),
        modbus_client::ReadPayload::Bits(_) => panic!("expected register payload"),
    }
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
