use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Number};
use crate::{
    error::{GradingError, Result},
    types::{BeanResult, GradingOutcome},
};

fn closed_ring(contour: &[[f32; 2]]) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = contour
        .iter()
        .map(|&[x, y]| vec![x as f64, y as f64])
        .collect();
    if let (Some(first), Some(last)) = (ring.first().cloned(), ring.last()) {
        if &first != last {
            ring.push(first);
        }
    }
    ring
}

fn object_fields(value: serde_json::Value) -> Result<Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(GradingError::Serialization(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        )))),
    }
}

fn bean_feature(bean: &BeanResult) -> Result<Feature> {
    let geometry = Geometry::new(Value::Polygon(vec![closed_ring(&bean.contour)]));

    let mut properties = Map::new();
    properties.insert("index".to_string(), serde_json::Value::from(bean.index));
    properties.extend(object_fields(serde_json::to_value(&bean.assessment)?)?);
    properties.extend(object_fields(serde_json::to_value(bean.features)?)?);
    properties.insert("bbox".to_string(), serde_json::to_value(bean.bbox)?);
    if let Some(scores) = &bean.color_scores {
        properties.insert("color_scores".to_string(), serde_json::to_value(scores)?);
    }

    Ok(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: Some(geojson::feature::Id::Number(Number::from(bean.index))),
        properties: Some(properties),
        foreign_members: None,
    })
}

impl GradingOutcome {
    /// Bean outlines as polygons carrying their grades
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let features = self
            .beans
            .iter()
            .map(bean_feature)
            .collect::<Result<Vec<_>>>()?;

        // Lot summary goes in the collection's foreign members
        let mut foreign_members = Map::new();
        foreign_members.insert("image_width".to_string(), serde_json::Value::from(self.image_width));
        foreign_members.insert("image_height".to_string(), serde_json::Value::from(self.image_height));
        foreign_members.insert("bean_count".to_string(), serde_json::Value::from(self.beans.len()));
        foreign_members.insert("lot_report".to_string(), serde_json::to_value(&self.report)?);

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        let geojson = self.to_geojson()?;
        Ok(serde_json::to_string_pretty(&geojson)?)
    }

    /// Save GeoJSON to file
    pub fn save_geojson<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_ring_repeats_first_point() {
        let ring = closed_ring(&[[0.0, 0.0], [4.0, 0.0], [4.0, 3.0]]);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());

        let already_closed = closed_ring(&[[0.0, 0.0], [4.0, 0.0], [0.0, 0.0]]);
        assert_eq!(already_closed.len(), 3);
    }

    #[test]
    fn test_non_object_properties_are_a_serialization_error() {
        assert!(object_fields(serde_json::json!({"a": 1})).is_ok());
        assert!(matches!(
            object_fields(serde_json::Value::from(3)),
            Err(GradingError::Serialization(_))
        ));
    }
}
