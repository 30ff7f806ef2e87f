//! Parsing des tuples `<coordinates>` KML : `lng,lat[,alt]` séparés par des blancs

use geo::Coord;
use tracing::debug;

/// Parse le contenu d'un élément `<coordinates>`.
///
/// L'altitude est ignorée. Les tuples illisibles sont sautés.
pub fn parse_coordinates(text: &str) -> Vec<Coord> {
    let mut coords = Vec::new();

    for tuple in text.split_ascii_whitespace() {
        match parse_tuple(tuple) {
            Some(c) => coords.push(c),
            None => debug!(tuple = tuple, "Skipping malformed coordinate tuple"),
        }
    }

    coords
}

fn parse_tuple(tuple: &str) -> Option<Coord> {
    let mut parts = tuple.split(',');
    let x = parse_number(parts.next()?)?;
    let y = parse_number(parts.next()?)?;
    Some(Coord { x, y })
}

fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(raw).ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        let coords = parse_coordinates("105.8,21.0,0 105.9,21.1,12.5\n\t105.95,21.2");
        assert_eq!(
            coords,
            vec![
                Coord { x: 105.8, y: 21.0 },
                Coord { x: 105.9, y: 21.1 },
                Coord { x: 105.95, y: 21.2 },
            ]
        );
    }

    #[test]
    fn test_skip_malformed() {
        let coords = parse_coordinates("1,2 abc,3 4 5,6,7");
        assert_eq!(coords, vec![Coord { x: 1.0, y: 2.0 }, Coord { x: 5.0, y: 6.0 }]);
    }

    #[test]
    fn test_empty() {
        assert!(parse_coordinates("   ").is_empty());
    }
}
