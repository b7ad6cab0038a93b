use crate::error::{Error, Result};
use crate::record::{Provider, ProviderSet};
use chrono::{Local, NaiveDateTime};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// File-name-safe job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Accepts ASCII letters, digits, `-` and `_` only, so an id can never escape the job directory.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidJobId(raw.to_string()))
        }
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DescriptorFile {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    use_majestic: bool,
    #[serde(default)]
    use_ahrefs: bool,
    #[serde(default)]
    use_dataforseo: bool,
    #[serde(default)]
    majestic_api_key: Option<String>,
    #[serde(default)]
    ahrefs_api_key: Option<String>,
    #[serde(default)]
    dataforseo_api_key: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// A claimed job as read from its descriptor.
#[derive(Debug)]
pub struct JobDescriptor {
    pub id: JobId,
    pub urls: Vec<String>,
    pub providers: Arc<ProviderSet>,
    pub created_at: Option<NaiveDateTime>,
}

impl JobDescriptor {
    pub fn from_json(id: JobId, bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: String| Error::Descriptor {
            job_id: id.to_string(),
            reason,
        };

        let file: DescriptorFile =
            serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;

        if file.urls.is_empty() {
            return Err(malformed("no URLs".into()));
        }

        let created_at = file.created_at.as_deref().and_then(|raw| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map_err(|e| log::warn!("Job {}: ignoring created_at {:?}: {}", id, raw, e))
                .ok()
        });

        let mut providers = ProviderSet::new();
        let selections = [
            (Provider::Majestic, file.use_majestic, file.majestic_api_key),
            (Provider::Ahrefs, file.use_ahrefs, file.ahrefs_api_key),
            (Provider::DataForSeo, file.use_dataforseo, file.dataforseo_api_key),
        ];
        for (provider, enabled, key) in selections {
            if enabled {
                providers.enable(provider, key.map(SecretString::from));
            }
        }

        Ok(Self {
            urls: file.urls,
            providers: Arc::new(providers),
            created_at,
            id,
        })
    }

    pub fn total(&self) -> usize {
        self.urls.len()
    }
}

/// A submission from the front end, before it is written to the queue.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub urls: Vec<String>,
    pub credentials: BTreeMap<Provider, String>,
}

impl JobRequest {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            credentials: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, provider: Provider, credential: impl Into<String>) -> Self {
        self.credentials.insert(provider, credential.into());
        self
    }

    /// Serializes to the descriptor wire format after trimming and validating.
    pub fn to_descriptor_json(&self) -> Result<Vec<u8>> {
        let urls: Vec<String> = self
            .urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .collect();
        if urls.is_empty() {
            return Err(Error::Request("No URLs provided".into()));
        }

        for (provider, credential) in &self.credentials {
            if credential.trim().is_empty() {
                return Err(Error::Request(format!(
                    "{} API key is required when {} API is selected",
                    provider, provider
                )));
            }
        }

        let key = |provider: Provider| self.credentials.get(&provider).map(|c| c.trim().to_string());
        let file = DescriptorFile {
            urls,
            use_majestic: self.credentials.contains_key(&Provider::Majestic),
            use_ahrefs: self.credentials.contains_key(&Provider::Ahrefs),
            use_dataforseo: self.credentials.contains_key(&Provider::DataForSeo),
            majestic_api_key: key(Provider::Majestic),
            ahrefs_api_key: key(Provider::Ahrefs),
            dataforseo_api_key: key(Provider::DataForSeo),
            created_at: Some(Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn id() -> JobId {
        JobId::parse("job-1").unwrap()
    }

    #[test]
    fn job_ids_are_sanitized() {
        assert!(JobId::parse("3f2b9c1e-aaaa-4bbb-8ccc-123456789abc").is_ok());
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse(".hidden").is_err());
        assert!(JobId::parse(JobId::generate().as_str()).is_ok());
    }

    #[test]
    fn parses_front_end_descriptor() {
        let raw = br#"{
            "urls": ["example.com", "other.org"],
            "use_majestic": true, "majestic_api_key": "mj",
            "use_ahrefs": false, "ahrefs_api_key": "ignored",
            "use_dataforseo": true, "dataforseo_api_key": null,
            "created_at": "2024-05-01T12:00:00.123456"
        }"#;
        let job = JobDescriptor::from_json(id(), raw).unwrap();

        assert_eq!(job.total(), 2);
        assert_eq!(
            job.providers.providers().collect::<Vec<_>>(),
            vec![Provider::Majestic, Provider::DataForSeo]
        );
        let majestic = job.providers.iter().next().unwrap();
        assert_eq!(majestic.credential.as_ref().unwrap().expose_secret(), "mj");
        assert!(job.providers.iter().nth(1).unwrap().credential.is_none());
        assert!(job.created_at.is_some());
    }

    #[test]
    fn rejects_empty_or_invalid_descriptors() {
        assert!(matches!(
            JobDescriptor::from_json(id(), br#"{"urls": []}"#),
            Err(Error::Descriptor { .. })
        ));
        assert!(matches!(
            JobDescriptor::from_json(id(), b"{not json"),
            Err(Error::Descriptor { .. })
        ));
    }

    #[test]
    fn bad_timestamp_is_ignored() {
        let job = JobDescriptor::from_json(id(), br#"{"urls": ["a.com"], "created_at": "yesterday"}"#)
            .unwrap();
        assert!(job.created_at.is_none());
    }

    #[test]
    fn request_round_trips_through_descriptor_format() {
        let request = JobRequest::new([" example.com ", "", "other.org"])
            .with_source(Provider::Ahrefs, "token");
        let bytes = request.to_descriptor_json().unwrap();
        let job = JobDescriptor::from_json(id(), &bytes).unwrap();

        assert_eq!(job.urls, vec!["example.com", "other.org"]);
        assert_eq!(job.providers.providers().collect::<Vec<_>>(), vec![Provider::Ahrefs]);
        assert!(job.created_at.is_some());
    }

    #[test]
    fn request_validation() {
        assert!(matches!(
            JobRequest::new(["  "]).to_descriptor_json(),
            Err(Error::Request(_))
        ));
        let missing_key = JobRequest::new(["a.com"]).with_source(Provider::Majestic, " ");
        assert!(matches!(missing_key.to_descriptor_json(), Err(Error::Request(_))));
    }
}
