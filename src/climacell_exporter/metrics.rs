// climacell_exporter - Prometheus metrics exporter for the ClimaCell weather API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{Field, FieldSet, Location, Observation};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

const NAMESPACE: &str = "climacell";

type GaugeFamily = Family<LocationLabels, Gauge<f64, AtomicU64>>;

/// Independently toggleable group of related quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Weather,
    AirQuality,
}

impl Layer {
    /// Subsystem used as part of the name of each metric in the layer.
    pub fn subsystem(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::AirQuality => "aq",
        }
    }

    pub fn quantities(self) -> impl Iterator<Item = &'static Quantity> {
        QUANTITIES.iter().filter(move |q| q.layer == self)
    }
}

/// Which layers are exported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layers {
    pub weather: bool,
    pub air_quality: bool,
}

impl Layers {
    pub fn is_enabled(&self, layer: Layer) -> bool {
        match layer {
            Layer::Weather => self.weather,
            Layer::AirQuality => self.air_quality,
        }
    }

    /// All quantities that belong to an enabled layer, in catalogue order.
    pub fn quantities(self) -> impl Iterator<Item = &'static Quantity> {
        QUANTITIES.iter().filter(move |q| self.is_enabled(q.layer))
    }

    /// Fields to request from the API for all enabled layers.
    pub fn field_set(&self) -> FieldSet {
        self.quantities().map(|q| q.field).collect()
    }
}

/// Definition of a single exported quantity.
#[derive(Debug, PartialEq, Eq)]
pub struct Quantity {
    pub layer: Layer,
    pub field: Field,
    pub help: &'static str,
}

impl Quantity {
    const fn new(layer: Layer, field: Field, help: &'static str) -> Self {
        Quantity { layer, field, help }
    }

    /// Name of the metric without the namespace, e.g. `weather_temp`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.layer.subsystem(), self.field.as_str())
    }

    /// Fully qualified name of the metric, e.g. `climacell_weather_temp`.
    pub fn full_name(&self) -> String {
        format!("{}_{}", NAMESPACE, self.name())
    }
}

/// Every quantity that can be exported, grouped by layer.
pub static QUANTITIES: &[Quantity] = &[
    Quantity::new(Layer::Weather, Field::BaroPressure, "Barometric pressure (at surface)"),
    Quantity::new(
        Layer::Weather,
        Field::CloudBase,
        "The lowest level at which the air contains a perceptible quantity of cloud particles",
    ),
    Quantity::new(
        Layer::Weather,
        Field::CloudCeiling,
        "The height of the lowest layer of clouds which covers more than half of the sky",
    ),
    Quantity::new(Layer::Weather, Field::CloudCover, "Fraction of the sky obscured by clouds"),
    Quantity::new(Layer::Weather, Field::Dewpoint, "Temperature of the dew point"),
    Quantity::new(Layer::Weather, Field::FeelsLike, "Wind chill and heat window based on season"),
    Quantity::new(Layer::Weather, Field::Humidity, "Percent relative humidity from 0 - 100%"),
    Quantity::new(Layer::Weather, Field::Precipitation, "Precipitation intensity"),
    Quantity::new(
        Layer::Weather,
        Field::SurfaceShortwaveRadiation,
        "Solar radiation reaching the surface",
    ),
    Quantity::new(Layer::Weather, Field::Temp, "Temperature"),
    Quantity::new(Layer::Weather, Field::Visibility, "Visibility distance"),
    Quantity::new(
        Layer::Weather,
        Field::WindDirection,
        "Wind direction in polar degrees 0-360 where 0 is North",
    ),
    Quantity::new(Layer::Weather, Field::WindGust, "Wind gust speed"),
    Quantity::new(Layer::Weather, Field::WindSpeed, "Wind speed"),
    Quantity::new(Layer::AirQuality, Field::ChinaAqi, "Air quality index per China MEP standard"),
    Quantity::new(Layer::AirQuality, Field::EpaAqi, "Air quality index per US EPA standard"),
    Quantity::new(Layer::AirQuality, Field::Co, "Carbon Monoxide"),
    Quantity::new(Layer::AirQuality, Field::No2, "Nitrogen Dioxide"),
    Quantity::new(Layer::AirQuality, Field::O3, "Ozone"),
    Quantity::new(Layer::AirQuality, Field::Pm10, "Particulate Matter < 10 μm"),
    Quantity::new(Layer::AirQuality, Field::Pm25, "Particulate Matter < 2.5 μm"),
    Quantity::new(Layer::AirQuality, Field::So2, "Sulfur Dioxide"),
];

/// Labels applied to every exported metric.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LocationLabels {
    pub latitude: String,
    pub longitude: String,
    pub city: String,
    pub location_name: String,
}

impl From<&Location> for LocationLabels {
    fn from(location: &Location) -> Self {
        LocationLabels {
            latitude: location.latitude.to_string(),
            longitude: location.longitude.to_string(),
            city: location.city.clone(),
            location_name: location.name.clone(),
        }
    }
}

/// A value emitted for a quantity during a single scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub quantity: &'static Quantity,
    pub labels: LocationLabels,
    pub value: f64,
    pub timestamp: SystemTime,
}

/// Output of a single scrape: descriptions of quantities and any values emitted for them.
///
/// Only quantities that are described can have values emitted. Descriptions are
/// encoded even when no value was emitted for a quantity.
#[derive(Debug, Default)]
pub struct Exposition {
    families: BTreeMap<Field, (&'static Quantity, GaugeFamily)>,
    samples: Vec<Sample>,
}

impl Exposition {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(&mut self, quantity: &'static Quantity) {
        self.families
            .entry(quantity.field)
            .or_insert_with(|| (quantity, GaugeFamily::default()));
    }

    fn emit(&mut self, quantity: &'static Quantity, labels: &LocationLabels, value: f64) {
        self.describe(quantity);
        if let Some((_, family)) = self.families.get(&quantity.field) {
            family.get_or_create(labels).set(value);
        }

        self.samples.push(Sample {
            quantity,
            labels: labels.clone(),
            value,
            timestamp: SystemTime::now(),
        });
    }

    pub fn is_described(&self, field: Field) -> bool {
        self.families.contains_key(&field)
    }

    pub fn described(&self) -> impl Iterator<Item = &'static Quantity> + '_ {
        self.families.values().map(|(q, _)| *q)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Value emitted for a field during this scrape, if any.
    pub fn value(&self, field: Field) -> Option<f64> {
        self.samples.iter().find(|s| s.quantity.field == field).map(|s| s.value)
    }

    /// Encode the exposition in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut registry = Registry::with_prefix(NAMESPACE);
        for (quantity, family) in self.families.values() {
            registry.register(quantity.name(), quantity.help, family.clone());
        }

        let mut buf = String::new();
        encode(&mut buf, &registry)?;
        Ok(buf)
    }
}

/// Holder for the quantities of enabled layers and the last value set for each.
///
/// A slot is created for each quantity of each enabled layer when the registry is
/// built and lives as long as the registry does. Values are only ever overwritten
/// by a present observation, never cleared.
#[derive(Debug)]
pub struct MetricRegistry {
    layers: Layers,
    slots: BTreeMap<Field, RwLock<HashMap<LocationLabels, f64>>>,
}

impl MetricRegistry {
    pub fn new(layers: Layers) -> Self {
        let slots = layers.quantities().map(|q| (q.field, RwLock::default())).collect();
        Self { layers, slots }
    }

    /// Quantities of all enabled layers.
    pub fn quantities(&self) -> impl Iterator<Item = &'static Quantity> {
        self.layers.quantities()
    }

    /// Announce every quantity of the enabled layers, whether or not values exist for them.
    pub fn describe(&self, out: &mut Exposition) {
        for quantity in self.quantities() {
            out.describe(quantity);
        }
    }

    /// Set the slot for a quantity and emit it, but only if the observation is present.
    ///
    /// An absent observation leaves the slot untouched and emits nothing for the
    /// quantity. Quantities from disabled layers are ignored.
    pub fn set_and_emit(
        &self,
        quantity: &'static Quantity,
        labels: &LocationLabels,
        observation: Observation,
        out: &mut Exposition,
    ) {
        let slot = match self.slots.get(&quantity.field) {
            Some(s) => s,
            None => {
                tracing::trace!(message = "ignoring quantity from disabled layer", quantity = %quantity.full_name());
                return;
            }
        };

        match observation {
            Observation::Present(v) => {
                slot.write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(labels.clone(), v);
                out.emit(quantity, labels, v);
            }
            Observation::Absent => {
                tracing::debug!(
                    message = "quantity absent from response, not emitting",
                    quantity = %quantity.full_name(),
                    last_known = ?self.last_known(quantity.field, labels),
                );
            }
        }
    }

    /// Most recent value set for a field and labels by any scrape.
    pub fn last_known(&self, field: Field, labels: &LocationLabels) -> Option<f64> {
        self.slots.get(&field).and_then(|s| {
            s.read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(labels)
                .copied()
        })
    }
}
