//! LTA OneMotoring traffic-camera pages.
//!
//! The index page lists locations as buttons inside the camera map; each
//! location page lists its cameras as cards inside the snapshots block.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Location, RawCameraRecord, TrafficDirectory};

pub const DEFAULT_INDEX_URL: &str = "https://onemotoring.lta.gov.sg/content/onemotoring/home/driving/traffic_information/traffic-cameras/cte.html";
pub const DEFAULT_CAMERA_PAGE_BASE: &str =
    "https://onemotoring.lta.gov.sg/content/onemotoring/home/driving/traffic_information/traffic-cameras/";

const NO_DESCRIPTION: &str = "No description";
const NO_TIMESTAMP: &str = "No timestamp";

/// Scrapes locations and cameras from OneMotoring.
pub struct OneMotoringDirectory {
    agent: ureq::Agent,
    index_url: String,
    camera_page_base: Url,
}

impl OneMotoringDirectory {
    pub fn new(index_url: &str, camera_page_base: &str, timeout: Duration) -> Result<Self> {
        Url::parse(index_url).with_context(|| format!("parse index url {}", index_url))?;
        let mut base = camera_page_base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let camera_page_base =
            Url::parse(&base).with_context(|| format!("parse camera page base {}", base))?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Ok(Self {
            agent,
            index_url: index_url.to_string(),
            camera_page_base,
        })
    }

    /// Url of the camera page for `location_id`.
    ///
    /// Ids come from scraped markup and must be `[A-Za-z0-9_-]+`, so the page
    /// always lands directly under the base.
    pub fn camera_page_url(&self, location_id: &str) -> Result<Url> {
        let well_formed = !location_id.is_empty()
            && location_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !well_formed {
            return Err(anyhow!("malformed location id '{}'", location_id));
        }
        self.camera_page_base
            .join(&format!("{}.html", location_id))
            .with_context(|| format!("build camera page url for '{}'", location_id))
    }

    fn get_text(&self, url: &str) -> Result<String> {
        self.agent
            .get(url)
            .call()
            .with_context(|| format!("GET {}", url))?
            .into_string()
            .with_context(|| format!("read body of {}", url))
    }
}

impl TrafficDirectory for OneMotoringDirectory {
    fn locations(&self) -> Result<Vec<Location>> {
        let body = self.get_text(&self.index_url)?;
        parse_locations(&body)
    }

    fn cameras(&self, location_id: &str) -> Result<Vec<RawCameraRecord>> {
        let page_url = self.camera_page_url(location_id)?;
        let body = self.get_text(page_url.as_str())?;
        parse_cameras(&body, &page_url)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {:?}", css, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse the location buttons of the camera map.
///
/// A page without the map container is rejected; buttons without an id are
/// skipped.
pub fn parse_locations(html: &str) -> Result<Vec<Location>> {
    let document = Html::parse_document(html);
    let map = document
        .select(&selector("div.image-showcase.map")?)
        .next()
        .ok_or_else(|| anyhow!("location index has no camera map"))?;

    let button = selector("button")?;
    let mut locations = Vec::new();
    for btn in map.select(&button) {
        let Some(id) = btn.value().attr("id").map(str::trim).filter(|id| !id.is_empty()) else {
            log::debug!("skipping location button without id: {:?}", element_text(btn));
            continue;
        };
        locations.push(Location::new(id, element_text(btn)));
    }
    Ok(locations)
}

/// Parse the camera cards of a location page.
///
/// A page without the snapshots block is rejected; a block without cards is
/// an empty camera list. Cards without an image source are skipped.
pub fn parse_cameras(html: &str, page_url: &Url) -> Result<Vec<RawCameraRecord>> {
    let document = Html::parse_document(html);
    let snapshots = document
        .select(&selector("div.snapshots")?)
        .next()
        .ok_or_else(|| anyhow!("camera page {} has no snapshots block", page_url))?;

    let card_sel = selector("div.card")?;
    let desc = selector("div.trf-desc")?;
    let timestamp = selector("div.timestamp")?;
    let img_sel = selector("img")?;

    let mut cameras = Vec::new();
    for card in snapshots.select(&card_sel) {
        let Some(src) = card
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
        else {
            continue;
        };
        let image_url = page_url
            .join(src)
            .with_context(|| format!("resolve camera image url '{}'", src))?;
        let description = card
            .select(&desc)
            .next()
            .map(element_text)
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());
        let timestamp_text = card
            .select(&timestamp)
            .next()
            .map(element_text)
            .unwrap_or_else(|| NO_TIMESTAMP.to_string());
        cameras.push(RawCameraRecord::new(
            description,
            timestamp_text,
            image_url.to_string(),
        ));
    }
    Ok(cameras)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <html><body>
          <div class="image-showcase map">
            <button id="ayer-rajah-expressway"> AYE </button>
            <button id="cte">CTE</button>
            <button>Legend</button>
          </div>
        </body></html>"#;

    const CTE_PAGE: &str = r#"
        <html><body>
          <div class="snapshots">
            <div class="card">
              <div class="trf-desc"> View from Braddell Flyover </div>
              <div class="timestamp">12 Jan 2025 10:20</div>
              <img src="//images.data.gov.sg/api/traffic/1701.jpg">
            </div>
            <div class="card">
              <img src="/cams/1702.jpg">
            </div>
            <div class="card">
              <div class="trf-desc">Camera offline</div>
            </div>
          </div>
        </body></html>"#;

    fn page_url() -> Url {
        Url::parse("https://onemotoring.lta.gov.sg/traffic-cameras/cte.html").unwrap()
    }

    #[test]
    fn parses_location_buttons() {
        let locations = parse_locations(INDEX).unwrap();
        assert_eq!(
            locations,
            vec![
                Location::new("ayer-rajah-expressway", "AYE"),
                Location::new("cte", "CTE"),
            ]
        );
    }

    #[test]
    fn index_without_map_is_rejected() {
        assert!(parse_locations("<html><body><p>maintenance</p></body></html>").is_err());
    }

    #[test]
    fn parses_camera_cards_with_defaults() {
        let cameras = parse_cameras(CTE_PAGE, &page_url()).unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].description, "View from Braddell Flyover");
        assert_eq!(cameras[0].timestamp_text, "12 Jan 2025 10:20");
        assert_eq!(
            cameras[0].image_url,
            "https://images.data.gov.sg/api/traffic/1701.jpg"
        );
        assert_eq!(cameras[1].description, "No description");
        assert_eq!(cameras[1].timestamp_text, "No timestamp");
        assert_eq!(cameras[1].image_url, "https://onemotoring.lta.gov.sg/cams/1702.jpg");
    }

    #[test]
    fn empty_snapshots_block_is_an_empty_list() {
        let html = r#"<div class="snapshots"></div>"#;
        assert!(parse_cameras(html, &page_url()).unwrap().is_empty());
    }

    #[test]
    fn page_without_snapshots_block_is_rejected() {
        assert!(parse_cameras("<div class='news'></div>", &page_url()).is_err());
    }

    #[test]
    fn camera_page_url_is_built_from_base() {
        let dir =
            OneMotoringDirectory::new(DEFAULT_INDEX_URL, "https://example.test/cams", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            dir.camera_page_url("pie").unwrap().as_str(),
            "https://example.test/cams/pie.html"
        );
    }

    #[test]
    fn malformed_location_ids_never_leave_the_base() {
        let dir =
            OneMotoringDirectory::new(DEFAULT_INDEX_URL, "https://example.test/cams/", Duration::from_secs(1))
                .unwrap();
        for id in ["../admin", "//evil.test/x", "https://evil.test/x", "a b", "", "cte?x=1"] {
            assert!(dir.camera_page_url(id).is_err(), "accepted '{}'", id);
            assert!(dir.cameras(id).is_err());
        }
        assert!(dir.camera_page_url("woodlands_checkpoint-2").is_ok());
    }
}
