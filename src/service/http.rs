//! HTTP client for the geometric service.
//!
//! Geometric operations take form-encoded bodies whose values are JSON
//! strings (`geoms=[...]`); raster computations are plain GET queries.

use async_trait::async_trait;
use geojson::{FeatureCollection, Geometry};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{BooleanMatrix, ClueAnnotation, GeocodeQuery, GeometryService, SunRequest};
use crate::config::ServiceConfig;
use crate::error::{ChoucasError, ChoucasResult, ServiceError};
use crate::geometry::Region;
use crate::reference::RefCategory;

/// [`GeometryService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGeometryService {
    client: Client,
    base_url: String,
    geocoder_url: String,
}

impl HttpGeometryService {
    /// Creates a client from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(cfg: &ServiceConfig) -> ChoucasResult<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ChoucasError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            geocoder_url: cfg.geocoder_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(endpoint: &str, req: RequestBuilder) -> Result<T, ServiceError> {
        info!(endpoint, "service request");
        let resp = req.send().await.map_err(|e| ServiceError::Request {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let out = resp.json::<T>().await.map_err(|e| ServiceError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        debug!(endpoint, "service response decoded");
        Ok(out)
    }

    async fn post_form<T: DeserializeOwned>(&self, endpoint: &str, form: &[(&str, String)]) -> Result<T, ServiceError> {
        Self::send(endpoint, self.client.post(self.url(endpoint)).form(form)).await
    }

    async fn predicate(&self, endpoint: &str, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError> {
        let form = [
            ("geoms1", to_json(endpoint, geoms1)?),
            ("geoms2", to_json(endpoint, geoms2)?),
        ];
        self.post_form(endpoint, &form).await
    }
}

fn to_json<T: serde::Serialize + ?Sized>(endpoint: &str, value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Request {
        endpoint: endpoint.to_string(),
        message: format!("cannot encode request: {e}"),
    })
}

/// Viewshed positions are sent as `lat,lon`; several are wrapped in parentheses.
fn viewshed_coordinates(coordinates: &[[f64; 2]]) -> String {
    match coordinates {
        [[x, y]] => format!("{y},{x}"),
        many => many
            .iter()
            .map(|[x, y]| format!("({y},{x})"))
            .collect::<Vec<_>>()
            .join(","),
    }
}

#[async_trait]
impl GeometryService for HttpGeometryService {
    async fn buffer(&self, geoms: &[Geometry], distance: f64, uncertainty: f64) -> Result<Geometry, ServiceError> {
        let form = [
            ("geoms", to_json("buffer", geoms)?),
            ("distance", distance.to_string()),
            ("uncertainty", uncertainty.to_string()),
        ];
        self.post_form("buffer", &form).await
    }

    async fn intersection(&self, geoms: &[Geometry]) -> Result<Geometry, ServiceError> {
        let form = [("geoms", to_json("intersection", geoms)?)];
        self.post_form("intersection", &form).await
    }

    async fn contains(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError> {
        self.predicate("contains", geoms1, geoms2).await
    }

    async fn intersects(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError> {
        self.predicate("intersects", geoms1, geoms2).await
    }

    async fn viewshed(
        &self,
        coordinates: &[[f64; 2]],
        height1: f64,
        height2: f64,
        region: Region,
    ) -> Result<FeatureCollection, ServiceError> {
        let query = [
            ("coordinates", viewshed_coordinates(coordinates)),
            ("height1", height1.to_string()),
            ("height2", height2.to_string()),
            ("region", region.to_string()),
        ];
        Self::send("viewshed", self.client.get(self.url("viewshed")).query(&query)).await
    }

    async fn sun(&self, request: SunRequest, region: Region) -> Result<FeatureCollection, ServiceError> {
        let mut query = vec![
            ("year", request.year.to_string()),
            ("month", request.month.to_string()),
            ("day", request.day.to_string()),
            ("hour", request.hour.to_string()),
            ("minute", request.minute.to_string()),
            ("region", region.to_string()),
        ];
        if request.sun {
            query.push(("sun", "true".to_string()));
        }
        Self::send("sun", self.client.get(self.url("sun")).query(&query)).await
    }

    async fn features(&self, category: RefCategory, geometry: &Geometry) -> Result<FeatureCollection, ServiceError> {
        let endpoint = format!("features/{category}");
        let form = [("geometry", to_json(&endpoint, geometry)?)];
        self.post_form(&endpoint, &form).await
    }

    async fn geocode(&self, query: &GeocodeQuery) -> Result<FeatureCollection, ServiceError> {
        let mut params = vec![("q", query.place_name.clone()), ("lang", "fr".to_string())];
        if let Some(tag) = query.osm_tag() {
            params.push(("osm_tag", tag));
        }
        if let Some([lon, lat]) = query.geo_bias {
            params.push(("lon", lon.to_string()));
            params.push(("lat", lat.to_string()));
        }
        Self::send("geocode", self.client.get(&self.geocoder_url).query(&params)).await
    }

    async fn parse_clue(&self, text: &str) -> Result<ClueAnnotation, ServiceError> {
        let form = [("clue_nl", text.to_string())];
        self.post_form("parse-clue", &form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewshed_coordinates_are_lat_lon() {
        assert_eq!(viewshed_coordinates(&[[5.5, 45.2]]), "45.2,5.5");
        assert_eq!(viewshed_coordinates(&[[5.5, 45.2], [6.0, 45.0]]), "(45.2,5.5),(45,6)");
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let cfg = ServiceConfig {
            base_url: "http://localhost:8008/".to_string(),
            ..ServiceConfig::default()
        };
        let svc = HttpGeometryService::new(&cfg).unwrap();
        assert_eq!(svc.url("buffer"), "http://localhost:8008/buffer");
    }
}
