//! Synthetic OT measurement model.
//!
//! A [`Measurement`] carries the reading of exactly one device [`Archetype`].
//! Only the fields that belong to that archetype are populated; every other
//! field is absent (not zero). The [`Status`] is derived from the archetype's
//! alert thresholds when the measurement is built and cannot be set directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Simulated device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    TempHumidity,
    Flow,
    Vibration,
    Power,
}

impl Archetype {
    /// Every archetype, in draw order.
    pub const ALL: [Archetype; 4] = [
        Archetype::TempHumidity,
        Archetype::Flow,
        Archetype::Vibration,
        Archetype::Power,
    ];

    /// Name used in device ids and topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::TempHumidity => "TempHumidity",
            Archetype::Flow => "Flow",
            Archetype::Vibration => "Vibration",
            Archetype::Power => "Power",
        }
    }

    /// Generation bounds and alert thresholds for the fields this archetype measures.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Archetype::TempHumidity => &TEMP_HUMIDITY_FIELDS,
            Archetype::Flow => &FLOW_FIELDS,
            Archetype::Vibration => &VIBRATION_FIELDS,
            Archetype::Power => &POWER_FIELDS,
        }
    }
}

impl std::fmt::Display for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named numeric field of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Temperature,
    Pressure,
    Humidity,
    Vibration,
    PowerConsumption,
    FlowRate,
}

impl Field {
    /// Fixed order in which fields are laid out in fieldbus registers.
    pub const REGISTER_ORDER: [Field; 6] = [
        Field::Temperature,
        Field::Pressure,
        Field::Humidity,
        Field::Vibration,
        Field::PowerConsumption,
        Field::FlowRate,
    ];

    /// Wire name of this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Pressure => "pressure",
            Field::Humidity => "humidity",
            Field::Vibration => "vibration",
            Field::PowerConsumption => "power_consumption",
            Field::FlowRate => "flow_rate",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Range, precision and alert threshold of one archetype field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Decimal places kept after rounding.
    pub precision: u32,
    /// Values strictly above this raise an alert (90% of `max`).
    pub alert_threshold: f64,
}

impl FieldSpec {
    /// Whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Whether `value` raises an alert for this field.
    pub fn is_alert(&self, value: f64) -> bool {
        value > self.alert_threshold
    }
}

const TEMP_HUMIDITY_FIELDS: [FieldSpec; 2] = [
    FieldSpec {
        field: Field::Temperature,
        min: 20.0,
        max: 100.0,
        precision: 2,
        alert_threshold: 90.0,
    },
    FieldSpec {
        field: Field::Humidity,
        min: 30.0,
        max: 80.0,
        precision: 1,
        alert_threshold: 72.0,
    },
];

const FLOW_FIELDS: [FieldSpec; 1] = [FieldSpec {
    field: Field::FlowRate,
    min: 50.0,
    max: 300.0,
    precision: 2,
    alert_threshold: 270.0,
}];

const VIBRATION_FIELDS: [FieldSpec; 1] = [FieldSpec {
    field: Field::Vibration,
    min: 0.0,
    max: 2.0,
    precision: 2,
    alert_threshold: 1.8,
}];

const POWER_FIELDS: [FieldSpec; 1] = [FieldSpec {
    field: Field::PowerConsumption,
    min: 50.0,
    max: 150.0,
    precision: 2,
    alert_threshold: 135.0,
}];

/// Round half away from zero at `places` decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Operational status of a device, derived from its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Operational,
    Alert,
}

impl Status {
    /// `Alert` if any populated field of `archetype` exceeds its threshold.
    pub fn evaluate(archetype: Archetype, readings: &Readings) -> Status {
        let alert = archetype.fields().iter().any(|spec| {
            readings
                .get(spec.field)
                .is_some_and(|value| spec.is_alert(value))
        });

        if alert { Status::Alert } else { Status::Operational }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Operational => write!(f, "Operational"),
            Status::Alert => write!(f, "Alert"),
        }
    }
}

/// Sparse set of numeric readings. Unmeasured fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Readings {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vibration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    power_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flow_rate: Option<f64>,
}

impl Readings {
    /// Value of `field`, if measured.
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Temperature => self.temperature,
            Field::Pressure => self.pressure,
            Field::Humidity => self.humidity,
            Field::Vibration => self.vibration,
            Field::PowerConsumption => self.power_consumption,
            Field::FlowRate => self.flow_rate,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<f64> {
        match field {
            Field::Temperature => &mut self.temperature,
            Field::Pressure => &mut self.pressure,
            Field::Humidity => &mut self.humidity,
            Field::Vibration => &mut self.vibration,
            Field::PowerConsumption => &mut self.power_consumption,
            Field::FlowRate => &mut self.flow_rate,
        }
    }

    /// Populated fields in register order.
    pub fn populated(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        Field::REGISTER_ORDER
            .iter()
            .filter_map(|&field| self.get(field).map(|value| (field, value)))
    }
}

/// One synthesized device reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    timestamp: DateTime<Utc>,
    device_id: String,
    archetype: Archetype,
    #[serde(flatten)]
    readings: Readings,
    status: Status,
}

impl Measurement {
    /// Build a measurement for `archetype`, drawing one raw value per field.
    ///
    /// `draw` is called once for each field of the archetype, in table order.
    /// The raw value is rounded to the field precision; no clamping is applied.
    pub fn from_draws(
        timestamp: DateTime<Utc>,
        device_id: impl Into<String>,
        archetype: Archetype,
        mut draw: impl FnMut(&FieldSpec) -> f64,
    ) -> Self {
        let mut readings = Readings::default();
        for spec in archetype.fields() {
            *readings.slot(spec.field) = Some(round_to(draw(spec), spec.precision));
        }

        Self {
            timestamp,
            device_id: device_id.into(),
            archetype,
            status: Status::evaluate(archetype, &readings),
            readings,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn status(&self) -> Status {
        self.status
    }
}
