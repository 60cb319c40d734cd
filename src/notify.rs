/// Best-effort alarm notifications.
///
/// The ingestion reducer only reports `transitioned_to_alarm`; the hosting
/// layer calls `announce_alarm` with the outcome and an `AlarmNotifier`.
/// Delivery failures are logged and swallowed; no retries.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::MonitorError;
use crate::ingest::IngestOutcome;
use crate::model::Plant;
use crate::store::PlantStore;

pub trait AlarmNotifier: Send + Sync {
    fn notify(&self, plant: &Plant, message: &str);
}

/// Human-readable alert for a plant that just entered alarm.
pub fn alarm_message(plant: &Plant) -> String {
    let t = &plant.telemetry;
    let mut text = format!("🚨 ALARM - {}\n\n", plant.name);
    if !plant.location.is_empty() {
        text.push_str(&format!("📍 {}\n", plant.location));
    }
    text.push_str(&format!("⚠️ {}\n\n", t.alarm_message));
    text.push_str("📊 Current values:\n");
    text.push_str(&format!("• Purity: {:.1}%\n", t.purity_pct));
    text.push_str(&format!("• Pressure: {:.1} bar\n", t.pressure_bar));
    text.push_str(&format!("• Temperature: {:.1}°C", t.temperature_c));
    text
}

/// Notify when `outcome` is an alarm edge. Returns whether a notification was sent.
pub fn announce_alarm<S: PlantStore>(
    store: &mut S,
    notifier: &dyn AlarmNotifier,
    outcome: &IngestOutcome,
) -> Result<bool, MonitorError> {
    if !outcome.transitioned_to_alarm {
        return Ok(false);
    }
    announce_plant_alarm(store, notifier, &outcome.plant_id)
}

/// Notify the current alarm of `plant_id` unconditionally.
pub fn announce_plant_alarm<S: PlantStore>(
    store: &mut S,
    notifier: &dyn AlarmNotifier,
    plant_id: &str,
) -> Result<bool, MonitorError> {
    match store.get_plant(plant_id)? {
        Some(plant) => {
            notifier.notify(&plant, &alarm_message(&plant));
            Ok(true)
        }
        None => Ok(false),
    }
}

// ---------------------------------------------------------------------------
// Notifiers
// ---------------------------------------------------------------------------

/// Writes the alert to the log. Used when no webhook is configured.
pub struct LogNotifier;

impl AlarmNotifier for LogNotifier {
    fn notify(&self, plant: &Plant, message: &str) {
        warn!(plant_id = %plant.id, "{}", message);
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    plant_id: &'a str,
    plant_name: &'a str,
    message: &'a str,
}

/// POSTs `{plant_id, plant_name, message}` as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl AlarmNotifier for WebhookNotifier {
    fn notify(&self, plant: &Plant, message: &str) {
        let payload = WebhookPayload {
            plant_id: &plant.id,
            plant_name: &plant.name,
            message,
        };
        match self.client.post(&self.url).json(&payload).send() {
            Ok(response) if response.status().is_success() => {
                info!(plant_id = %plant.id, "alarm webhook delivered");
            }
            Ok(response) => {
                warn!(plant_id = %plant.id, status = %response.status(), "alarm webhook rejected");
            }
            Err(e) => {
                warn!(plant_id = %plant.id, error = %e, "alarm webhook failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest, ReadingPayload};
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl AlarmNotifier for Recorder {
        fn notify(&self, plant: &Plant, message: &str) {
            self.0.lock().unwrap().push((plant.id.clone(), message.to_string()));
        }
    }

    fn alarm_reading() -> ReadingPayload {
        ReadingPayload {
            purity_pct: Some(88.25),
            pressure_bar: Some(5.0),
            temperature_c: Some(35.0),
            alarm: Some(true),
            alarm_message: Some("Low purity".to_string()),
            ..ReadingPayload::default()
        }
    }

    #[test]
    fn test_alarm_message_contains_current_values() {
        let mut plant = Plant::provisioned("norte", "Hospital Norte".to_string(), chrono::Utc::now());
        plant.location = "Block C".to_string();
        plant.telemetry.alarm_message = "Low purity".to_string();
        plant.telemetry.purity_pct = 88.25;

        let text = alarm_message(&plant);
        assert!(text.contains("Hospital Norte"));
        assert!(text.contains("📍 Block C"));
        assert!(text.contains("⚠️ Low purity"));
        assert!(text.contains("Purity: 88.2%") || text.contains("Purity: 88.3%"));
    }

    #[test]
    fn test_only_alarm_edges_are_announced() {
        let mut store = MemoryStore::new();
        let recorder = Recorder::default();

        let first = ingest(&mut store, Some("norte"), &alarm_reading()).unwrap();
        let second = ingest(&mut store, Some("norte"), &alarm_reading()).unwrap();

        assert!(announce_alarm(&mut store, &recorder, &first).unwrap());
        assert!(!announce_alarm(&mut store, &recorder, &second).unwrap());

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "norte");
        assert!(sent[0].1.contains("Low purity"));
    }

    #[test]
    fn test_webhook_posts_json() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind test server");
        let addr = server.server_addr().to_ip().expect("ip listener");

        let handle = std::thread::spawn(move || {
            let mut request = server.recv().expect("webhook request");
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let method = request.method().clone();
            request.respond(tiny_http::Response::empty(204)).unwrap();
            (method, body)
        });

        let notifier = WebhookNotifier::new(&format!("http://{}/hook", addr), Duration::from_secs(5)).unwrap();
        let plant = Plant::provisioned("norte", "Hospital Norte".to_string(), chrono::Utc::now());
        notifier.notify(&plant, "test alarm");

        let (method, body) = handle.join().unwrap();
        assert_eq!(method, tiny_http::Method::Post);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["plant_id"], "norte");
        assert_eq!(json["plant_name"], "Hospital Norte");
        assert_eq!(json["message"], "test alarm");
    }

    #[test]
    fn test_unreachable_webhook_does_not_panic() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        let plant = Plant::provisioned("norte", "Norte".to_string(), chrono::Utc::now());
        notifier.notify(&plant, "ignored");
    }
}
