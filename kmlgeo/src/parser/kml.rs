//! Parcours événementiel d'un document KML (quick-xml)
//!
//! Seuls les Placemark produisent des features. Les Document / Folder sont
//! traversés sans être interprétés.

use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use super::coords::parse_coordinates;
use crate::types::{ParsedFeature, Properties};
use crate::KmlError;

/// Éléments texte d'un Placemark recopiés tels quels dans les attributs
const TEXT_PROPERTIES: &[&str] = &["name", "description", "address", "phoneNumber", "styleUrl"];

/// Parse un document KML en liste de features
pub fn parse_document(text: &str) -> Result<Vec<ParsedFeature>, KmlError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut walker = Walker::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => walker.start(&e),
            Ok(Event::Empty(e)) => {
                walker.start(&e);
                walker.end(&local_name(&e))?;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                walker.end(&name)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| {
                    KmlError::malformed(format!("{} at position {}", err, reader.buffer_position()))
                })?;
                walker.text(&text);
            }
            Ok(Event::CData(e)) => {
                walker.text(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(KmlError::malformed(format!(
                    "{} at position {}",
                    err,
                    reader.buffer_position()
                )));
            }
        }
    }

    walker.finish()
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|a| a.key.local_name().as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[derive(Debug, Default)]
struct Walker {
    stack: Vec<String>,
    text: String,
    seen_root: bool,
    placemark: Option<Placemark>,
    features: Vec<ParsedFeature>,
}

/// État du Placemark en cours
#[derive(Debug, Default)]
struct Placemark {
    /// Profondeur de l'élément Placemark dans la pile
    depth: usize,
    properties: Properties,
    geometries: Vec<Geometry>,
    /// Une frame par MultiGeometry ouvert
    multi: Vec<Vec<Geometry>>,
    polygon: Option<PolygonParts>,
    coords: Vec<Coord>,
    data_name: Option<String>,
}

#[derive(Debug, Default)]
struct PolygonParts {
    outer: Option<LineString>,
    inners: Vec<LineString>,
}

impl Placemark {
    fn emit(&mut self, geometry: Geometry) {
        match self.multi.last_mut() {
            Some(frame) => frame.push(geometry),
            None => self.geometries.push(geometry),
        }
    }

    fn into_feature(mut self) -> ParsedFeature {
        let geometry = match self.geometries.len() {
            0 => None,
            1 => self.geometries.pop(),
            _ => combine(self.geometries),
        };
        ParsedFeature::new(geometry, self.properties)
    }
}

impl Walker {
    fn start(&mut self, e: &BytesStart) {
        let name = local_name(e);
        self.seen_root = true;

        if name == "Placemark" && self.placemark.is_none() {
            self.placemark = Some(Placemark {
                depth: self.stack.len(),
                ..Default::default()
            });
        } else if let Some(pm) = self.placemark.as_mut() {
            match name.as_str() {
                "MultiGeometry" => pm.multi.push(Vec::new()),
                "Polygon" => pm.polygon = Some(PolygonParts::default()),
                "coordinates" => pm.coords.clear(),
                "Data" | "SimpleData" => pm.data_name = attribute(e, "name"),
                _ => {}
            }
        }

        self.text.clear();
        self.stack.push(name);
    }

    fn text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn end(&mut self, name: &str) -> Result<(), KmlError> {
        match self.stack.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(KmlError::malformed(format!(
                    "expected </{}>, found </{}>",
                    open, name
                )))
            }
            None => return Err(KmlError::malformed(format!("unexpected </{}>", name))),
        }

        let text = std::mem::take(&mut self.text);
        let parent = self.stack.last().map(String::as_str).unwrap_or("");

        let Some(pm) = self.placemark.as_mut() else {
            return Ok(());
        };

        match name {
            "Placemark" if self.stack.len() == pm.depth => {
                if let Some(pm) = self.placemark.take() {
                    self.features.push(pm.into_feature());
                }
            }
            "coordinates" => pm.coords = parse_coordinates(&text),
            "Point" => {
                let coords = std::mem::take(&mut pm.coords);
                if let Some(c) = coords.first() {
                    pm.emit(Geometry::Point(Point(*c)));
                }
            }
            "LineString" => {
                let coords = std::mem::take(&mut pm.coords);
                if !coords.is_empty() {
                    pm.emit(Geometry::LineString(LineString::new(coords)));
                }
            }
            "LinearRing" => {
                let ring = LineString::new(std::mem::take(&mut pm.coords));
                match (pm.polygon.as_mut(), parent) {
                    (Some(parts), "outerBoundaryIs") => parts.outer = Some(ring),
                    (Some(parts), "innerBoundaryIs") => parts.inners.push(ring),
                    _ if !ring.0.is_empty() => pm.emit(Geometry::Polygon(Polygon::new(ring, vec![]))),
                    _ => {}
                }
            }
            "Polygon" => {
                if let Some(parts) = pm.polygon.take() {
                    if let Some(outer) = parts.outer.filter(|r| !r.0.is_empty()) {
                        pm.emit(Geometry::Polygon(Polygon::new(outer, parts.inners)));
                    }
                }
            }
            "MultiGeometry" => {
                if let Some(members) = pm.multi.pop() {
                    if let Some(geometry) = combine(members) {
                        pm.emit(geometry);
                    }
                }
            }
            "visibility" if parent == "Placemark" => {
                let visible = matches!(text.trim(), "1" | "true");
                pm.properties.insert(name.to_string(), Value::Bool(visible));
            }
            "when" if parent == "TimeStamp" => {
                pm.properties.insert("timestamp".to_string(), Value::String(text));
            }
            "value" if parent == "Data" => {
                if let Some(key) = pm.data_name.clone() {
                    pm.properties.insert(key, Value::String(text));
                }
            }
            "SimpleData" => {
                if let Some(key) = pm.data_name.take() {
                    pm.properties.insert(key, Value::String(text));
                }
            }
            "Data" => pm.data_name = None,
            _ if parent == "Placemark" && TEXT_PROPERTIES.contains(&name) => {
                pm.properties.insert(name.to_string(), Value::String(text));
            }
            _ => {}
        }

        Ok(())
    }

    fn finish(self) -> Result<Vec<ParsedFeature>, KmlError> {
        if let Some(open) = self.stack.last() {
            return Err(KmlError::malformed(format!("unclosed element <{}>", open)));
        }
        if !self.seen_root {
            return Err(KmlError::malformed("no root element"));
        }
        Ok(self.features)
    }
}

/// Regroupe les membres d'un MultiGeometry.
///
/// Membres homogènes : Multi* correspondant, sinon GeometryCollection.
fn combine(members: Vec<Geometry>) -> Option<Geometry> {
    if members.is_empty() {
        return None;
    }

    if members.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = members
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect();
        return Some(Geometry::MultiPoint(MultiPoint::new(points)));
    }

    if members.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = members
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(ls) => Some(ls),
                _ => None,
            })
            .collect();
        return Some(Geometry::MultiLineString(MultiLineString::new(lines)));
    }

    if members.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polygons = members
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Polygon(p) => Some(p),
                _ => None,
            })
            .collect();
        return Some(Geometry::MultiPolygon(MultiPolygon::new(polygons)));
    }

    Some(Geometry::GeometryCollection(GeometryCollection::new_from(members)))
}
