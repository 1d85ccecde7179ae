//! Request bodies for each M2M endpoint.
//!
//! Every builder is a pure function of its typed parameters. Optional
//! parameters left unset are omitted from the body entirely.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Metres per degree of latitude, used to turn a radial search into a box.
const METRES_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Parameters for `dataset-search`.
#[derive(Debug, Clone, Default)]
pub struct DatasetSearch {
    pub dataset: Option<String>,
    pub catalog: Option<String>,
    pub lower_left: Option<Coordinate>,
    pub upper_right: Option<Coordinate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Parameters for `scene-search`.
///
/// A bounding box (`lower_left` + `upper_right`) takes precedence over a
/// radial search around `center`.
#[derive(Debug, Clone)]
pub struct SceneSearch {
    pub dataset: String,
    pub max_results: u32,
    pub starting_number: u32,
    pub sort_order: SortOrder,
    pub metadata_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lower_left: Option<Coordinate>,
    pub upper_right: Option<Coordinate>,
    pub center: Option<Coordinate>,
    /// Radius in metres for a search around `center`.
    pub distance: f64,
    /// Metadata filter id / value pairs, combined with `and`.
    pub filters: Vec<(String, String)>,
}

impl SceneSearch {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            max_results: 5000,
            starting_number: 1,
            sort_order: SortOrder::default(),
            metadata_type: None,
            start_date: None,
            end_date: None,
            lower_left: None,
            upper_right: None,
            center: None,
            distance: 100.0,
            filters: Vec::new(),
        }
    }
}

pub fn dataset_filters(dataset: &str) -> Value {
    json!({ "datasetName": dataset })
}

pub fn download_options<S: AsRef<str>>(dataset: &str, entity_ids: &[S]) -> Value {
    let ids: Vec<&str> = entity_ids.iter().map(AsRef::as_ref).collect();
    json!({ "datasetName": dataset, "entityIds": ids })
}

pub fn dataset_download_options(dataset: &str) -> Value {
    json!({ "datasetName": dataset })
}

pub fn download_request(dataset: &str, entity_id: &str, product_id: &str) -> Value {
    json!({
        "downloads": [{
            "label": format!("{dataset}-{entity_id}"),
            "entityId": entity_id,
            "productId": product_id,
        }]
    })
}

pub fn dataset_search(params: &DatasetSearch) -> Value {
    let mut body = Map::new();
    if let Some(dataset) = &params.dataset {
        body.insert("datasetName".into(), json!(dataset));
    }
    if let Some(catalog) = &params.catalog {
        body.insert("catalog".into(), json!(catalog));
    }
    if let (Some(ll), Some(ur)) = (params.lower_left, params.upper_right) {
        body.insert("spatialFilter".into(), mbr(ll, ur));
    }
    if let Some(range) = date_range(params.start_date, params.end_date) {
        body.insert("temporalFilter".into(), range);
    }
    Value::Object(body)
}

pub fn login(username: &str, token: &str) -> Value {
    json!({ "username": username, "token": token })
}

pub fn scene_metadata(dataset: &str, entity_id: &str) -> Value {
    json!({
        "datasetName": dataset,
        "entityId": entity_id,
        "metadataType": "full",
    })
}

pub fn scene_search(params: &SceneSearch) -> Value {
    let mut filter = Map::new();

    let spatial = match (params.lower_left, params.upper_right, params.center) {
        (Some(ll), Some(ur), _) => Some(mbr(ll, ur)),
        (_, _, Some(center)) => {
            let (ll, ur) = radial_box(center, params.distance);
            Some(mbr(ll, ur))
        }
        _ => None,
    };
    if let Some(spatial) = spatial {
        filter.insert("spatialFilter".into(), spatial);
    }
    if let Some(range) = date_range(params.start_date, params.end_date) {
        filter.insert("acquisitionFilter".into(), range);
    }
    if !params.filters.is_empty() {
        let children: Vec<Value> = params
            .filters
            .iter()
            .map(|(id, value)| {
                json!({
                    "filterType": "value",
                    "filterId": id,
                    "value": value,
                    "operand": "=",
                })
            })
            .collect();
        filter.insert(
            "metadataFilter".into(),
            json!({ "filterType": "and", "childFilters": children }),
        );
    }

    let mut body = Map::new();
    body.insert("datasetName".into(), json!(params.dataset));
    body.insert("maxResults".into(), json!(params.max_results));
    body.insert("startingNumber".into(), json!(params.starting_number));
    body.insert("sortDirection".into(), json!(params.sort_order.as_str()));
    if let Some(metadata_type) = &params.metadata_type {
        body.insert("metadataType".into(), json!(metadata_type));
    }
    if !filter.is_empty() {
        body.insert("sceneFilter".into(), Value::Object(filter));
    }
    Value::Object(body)
}

fn mbr(lower_left: Coordinate, upper_right: Coordinate) -> Value {
    json!({
        "filterType": "mbr",
        "lowerLeft": lower_left,
        "upperRight": upper_right,
    })
}

fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Value> {
    if start.is_none() && end.is_none() {
        return None;
    }
    let mut range = Map::new();
    if let Some(start) = start {
        range.insert("start".into(), json!(start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = end {
        range.insert("end".into(), json!(end.format("%Y-%m-%d").to_string()));
    }
    Some(Value::Object(range))
}

// Flat-earth approximation; fine for the sub-degree radii scene searches use.
fn radial_box(center: Coordinate, distance: f64) -> (Coordinate, Coordinate) {
    let dlat = distance / METRES_PER_DEGREE;
    let cos = center.latitude.to_radians().cos().abs().max(1e-6);
    let dlng = (dlat / cos).min(180.0);
    (
        Coordinate::new((center.latitude - dlat).max(-90.0), center.longitude - dlng),
        Coordinate::new((center.latitude + dlat).min(90.0), center.longitude + dlng),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_request_labels_the_download() {
        let body = download_request("landsat_ot_c2_l2", "LC81", "5e83d0b8");
        assert_eq!(body["downloads"][0]["label"], "landsat_ot_c2_l2-LC81");
        assert_eq!(body["downloads"][0]["productId"], "5e83d0b8");
    }

    #[test]
    fn download_options_lists_entities() {
        let body = download_options("ds", &["a", "b"]);
        assert_eq!(body, json!({"datasetName": "ds", "entityIds": ["a", "b"]}));
    }

    #[test]
    fn dataset_search_omits_unset_fields() {
        assert_eq!(dataset_search(&DatasetSearch::default()), json!({}));

        let body = dataset_search(&DatasetSearch {
            dataset: Some("landsat".into()),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 31),
            ..Default::default()
        });
        assert_eq!(body["datasetName"], "landsat");
        assert_eq!(body["temporalFilter"], json!({"start": "2020-01-31"}));
        assert!(body.get("spatialFilter").is_none());
    }

    #[test]
    fn scene_search_defaults() {
        let body = scene_search(&SceneSearch::new("landsat_ot_c2_l2"));
        assert_eq!(body["maxResults"], 5000);
        assert_eq!(body["startingNumber"], 1);
        assert_eq!(body["sortDirection"], "DESC");
        assert!(body.get("sceneFilter").is_none());
        assert!(body.get("metadataType").is_none());
    }

    #[test]
    fn scene_search_bounding_box_wins_over_center() {
        let mut params = SceneSearch::new("ds");
        params.lower_left = Some(Coordinate::new(1.0, 2.0));
        params.upper_right = Some(Coordinate::new(3.0, 4.0));
        params.center = Some(Coordinate::new(50.0, 50.0));
        let spatial = &scene_search(&params)["sceneFilter"]["spatialFilter"];
        assert_eq!(spatial["lowerLeft"], json!({"latitude": 1.0, "longitude": 2.0}));
        assert_eq!(spatial["upperRight"], json!({"latitude": 3.0, "longitude": 4.0}));
    }

    #[test]
    fn scene_search_radial_box_surrounds_center() {
        let mut params = SceneSearch::new("ds");
        params.center = Some(Coordinate::new(45.0, 10.0));
        params.distance = 10_000.0;
        let spatial = &scene_search(&params)["sceneFilter"]["spatialFilter"];
        let ll_lat = spatial["lowerLeft"]["latitude"].as_f64().unwrap();
        let ur_lng = spatial["upperRight"]["longitude"].as_f64().unwrap();
        assert!(ll_lat < 45.0 && ll_lat > 44.8);
        assert!(ur_lng > 10.0 && ur_lng < 10.2);
    }

    #[test]
    fn scene_search_metadata_filters_are_anded() {
        let mut params = SceneSearch::new("ds");
        params.filters = vec![("cloudCover".into(), "10".into())];
        params.end_date = NaiveDate::from_ymd_opt(2021, 12, 1);
        let filter = &scene_search(&params)["sceneFilter"];
        assert_eq!(filter["metadataFilter"]["filterType"], "and");
        assert_eq!(filter["metadataFilter"]["childFilters"][0]["filterId"], "cloudCover");
        assert_eq!(filter["acquisitionFilter"], json!({"end": "2021-12-01"}));
    }
}
