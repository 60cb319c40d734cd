/// Test fixtures: representative JSON payloads posted by plant controllers.
///
/// Payload shape:
///   plant_id         — string key of the plant (required)
///   pressure_bar     — adsorber outlet pressure
///   temperature_c    — compressor discharge temperature
///   purity_pct       — O2 purity at the buffer tank
///   flow_nm3h        — product flow
///   operating_hours  — cumulative hour meter
///   mode             — free-form controller state ("Production", "Standby", …)
///   alarm / alarm_message
///   name             — optional display name
///
/// Older controllers send every number as a string.

/// Normal production reading from a registered plant.
#[cfg(test)]
pub(crate) fn fixture_production_reading_json() -> &'static str {
    r#"{
      "plant_id": "hospital_central",
      "pressure_bar": 6.1,
      "temperature_c": 29.4,
      "purity_pct": 94.8,
      "flow_nm3h": 11.2,
      "operating_hours": 15230,
      "mode": "Production",
      "alarm": false,
      "alarm_message": ""
    }"#
}

/// Same plant, purity dropped and the controller raised its alarm.
#[cfg(test)]
pub(crate) fn fixture_alarm_reading_json() -> &'static str {
    r#"{
      "plant_id": "hospital_central",
      "pressure_bar": 5.2,
      "temperature_c": 33.0,
      "purity_pct": 89.7,
      "flow_nm3h": 9.8,
      "operating_hours": 15231,
      "mode": "Production",
      "alarm": true,
      "alarm_message": "Purity below 90%"
    }"#
}

/// Older controller: numbers as strings, empty flow, extra keys.
#[cfg(test)]
pub(crate) fn fixture_string_numbers_json() -> &'static str {
    r#"{
      "plant_id": "clinica_sur",
      "pressure_bar": "5.8",
      "temperature_c": "27",
      "purity_pct": "95.1",
      "flow_nm3h": "",
      "mode": "Production",
      "firmware": "2.3.1",
      "timestamp": "2024-05-01T12:00:00"
    }"#
}

/// Batch of three where the second element has no plant_id.
#[cfg(test)]
pub(crate) fn fixture_batch_missing_plant_json() -> &'static str {
    r#"[
      { "plant_id": "norte", "purity_pct": 94.0, "mode": "Production" },
      { "purity_pct": 93.5, "mode": "Production" },
      { "plant_id": "sur", "purity_pct": 92.1, "mode": "Maintenance" }
    ]"#
}
