use anyhow::{anyhow, Context};

const PAGE_SIZE_VAR: &str = "PETNOOK_COMMENT_PAGE_SIZE";

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of comments requested per page
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> StoreConfig {
        StoreConfig { page_size: 20 }
    }
}

impl StoreConfig {
    pub fn with_page_size(page_size: usize) -> StoreConfig {
        StoreConfig { page_size }
    }

    /// Reads overrides from the environment, falling back to defaults for unset variables
    pub fn from_env() -> anyhow::Result<StoreConfig> {
        let mut res = StoreConfig::default();
        if let Ok(size) = std::env::var(PAGE_SIZE_VAR) {
            res.page_size = size
                .parse()
                .with_context(|| format!("parsing {PAGE_SIZE_VAR} as a page size"))?;
        }
        res.validate()?;
        Ok(res)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.page_size == 0 {
            return Err(anyhow!("comment page size must be non-zero"));
        }
        Ok(())
    }
}
