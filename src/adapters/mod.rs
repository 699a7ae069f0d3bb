//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements     | Connects to                     |
//! |----------------|----------------|---------------------------------|
//! | `backend_http` | BackendHttp    | TCP socket, plain HTTP/1.1      |
//! | `device_id`    | -              | eFuse MAC, chip info            |
//! | `http_server`  | -              | ESP-IDF HTTP server (device)    |
//! | `log_sink`     | StatusSink     | Serial log output               |
//! |                | DisplaySink    |                                 |
//! | `mdns`         | Advertiser     | ESP-IDF mDNS component          |
//! | `mqtt_client`  | MqttClient     | ESP-IDF MQTT / in-memory broker |
//! | `nvs`          | StoragePort    | NVS / in-memory store           |
//! | `radio`        | RadioDriver    | ESP-NOW / in-memory air         |
//! | `serial`       | Transport      | UART (device only)              |
//! | `system`       | SystemPort     | Heap stats, `esp_restart`       |
//! | `time`         | Clock          | ESP32 high-resolution timer     |
//! | `wifi`         | NetworkPort    | ESP-IDF WiFi STA/AP, Ethernet   |
//! | `ws_client`    | WsClient       | ESP-IDF WebSocket client        |

pub mod backend_http;
pub mod device_id;
#[cfg(target_os = "espidf")]
pub mod http_server;
pub mod log_sink;
pub mod mdns;
pub mod mqtt_client;
pub mod nvs;
pub mod radio;
#[cfg(target_os = "espidf")]
pub mod serial;
pub mod system;
pub mod time;
pub(super) mod utils;
pub mod wifi;
pub mod ws_client;
