//! Read-through caching and cache maintenance on writes

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::cache::CacheStore;
use crate::capability::Capabilities;
use crate::config::CacheConfig;
use crate::entity::document::{document_id, from_document, to_document};
use crate::entity::{Entity, Presentation};
use crate::error::{Error, Result};
use crate::pipeline::{
    CacheMarker, CallContext, Interceptor, Next, Operation, OperationMarkers, Output, CACHE_ORDER,
};

const NAME: &str = "Caching";

/// Key expression: `#argument` followed by any number of `.field` segments
static KEY_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z_][A-Za-z0-9_]*)*)$")
        .expect("key expression regex is valid")
});

/// Cache key of one call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Evaluate a key expression such as `#id` or `#data.department.id`
    ///
    /// The first segment names an argument; the rest walk into its document.
    /// A missing field yields an empty key segment.
    pub fn evaluate(expression: &str, arguments: &[(&'static str, Value)]) -> Result<Self> {
        let captures = KEY_EXPRESSION.captures(expression).ok_or_else(|| {
            Error::BadRequest(format!("Invalid cache key expression: {}", expression))
        })?;
        let argument = &captures[1];

        let mut value = arguments
            .iter()
            .find(|(name, _)| *name == argument)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                Error::BadRequest(format!(
                    "Cache key expression {} names an unknown argument",
                    expression
                ))
            })?;

        let path = captures.get(2).map_or("", |m| m.as_str());
        for field in path.split('.').filter(|segment| !segment.is_empty()) {
            value = value.get(field).unwrap_or(&Value::Null);
        }

        Ok(Self(match value {
            Value::Null => String::new(),
            other => render(other),
        }))
    }

    /// Concatenation of every argument
    pub fn from_arguments(arguments: &[(&'static str, Value)]) -> Self {
        Self(arguments.iter().map(|(_, value)| render(value)).collect())
    }

    /// Key of a single value such as a result identifier
    pub fn from_value(value: &Value) -> Self {
        Self(render(value))
    }

    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Caches results in a [`CacheStore`]
pub struct CachingInterceptor {
    store: Arc<dyn CacheStore>,
    names: Vec<String>,
    all_suffix: String,
}

impl fmt::Debug for CachingInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingInterceptor")
            .field("names", &self.names)
            .field("all_suffix", &self.all_suffix)
            .finish_non_exhaustive()
    }
}

impl CachingInterceptor {
    /// Cache under the given default names
    pub fn new(store: Arc<dyn CacheStore>, names: Vec<String>) -> Self {
        Self::with_config(store, names, &CacheConfig::default())
    }

    /// Cache under the given default names, with the list-query suffix from configuration
    pub fn with_config(store: Arc<dyn CacheStore>, names: Vec<String>, config: &CacheConfig) -> Self {
        Self {
            store,
            names,
            all_suffix: config.all_suffix.clone(),
        }
    }

    fn names_of<'a>(&'a self, marker: &'a CacheMarker) -> &'a [String] {
        match marker.cache_names() {
            [] => self.names.as_slice(),
            names => names,
        }
    }

    async fn refresh_all(&self, names: &[String]) -> Result<()> {
        for name in names {
            self.store
                .clear(&format!("{}{}", name, self.all_suffix))
                .await?;
        }
        Ok(())
    }

    async fn put(&self, names: &[String], key: &CacheKey, document: Value) -> Result<()> {
        for name in names {
            tracing::info!("put in cache : {} in : {}", name, key);
            self.store.put(name, key.as_str(), document.clone()).await?;
        }
        Ok(())
    }

    async fn read_through<E: Entity, D: Presentation>(
        &self,
        operation: Operation<E, D>,
        key: CacheKey,
        names: Vec<String>,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        for name in &names {
            let Some(cached) = self.store.get(name, key.as_str()).await? else {
                continue;
            };
            match from_document::<Output<E, D>>(cached) {
                Ok(output) => {
                    tracing::debug!(cache = %name, key = %key, "Cache hit");
                    return Ok(output);
                }
                Err(e) => {
                    tracing::warn!(cache = %name, key = %key, "Discarding unreadable cache entry: {}", e);
                }
            }
        }

        let output = next.run(operation).await?;
        let document = to_document(&output)?;
        for name in &names {
            tracing::info!("get from cache or put : {} in : {}", name, key);
            self.store.put(name, key.as_str(), document.clone()).await?;
        }
        Ok(output)
    }
}

#[async_trait]
impl<E: Entity, D: Presentation> Interceptor<E, D> for CachingInterceptor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn order(&self) -> i32 {
        CACHE_ORDER
    }

    fn applies_to(&self, markers: &OperationMarkers, capabilities: &Capabilities) -> bool {
        markers.caching.is_some() && capabilities.cacheable
    }

    async fn intercept(
        &self,
        operation: Operation<E, D>,
        ctx: &CallContext,
        next: Next<'_, E, D>,
    ) -> Result<Output<E, D>> {
        let Some(marker) = ctx.markers.caching.as_ref() else {
            return next.run(operation).await;
        };
        ctx.method_call(NAME);

        let arguments = operation.arguments()?;
        let names = self.names_of(marker);
        let key = marker
            .key_expression()
            .map(|expression| CacheKey::evaluate(expression, &arguments))
            .transpose()?;

        let result = match marker {
            CacheMarker::Caching { suffix, .. } => {
                let suffix = suffix.as_deref().unwrap_or("");
                let names = names
                    .iter()
                    .map(|name| format!("{}{}", name, suffix))
                    .collect();
                let key = key.unwrap_or_else(|| CacheKey::from_arguments(&arguments));
                self.read_through(operation, key, names, next).await
            }
            CacheMarker::PutCache { refresh_all, .. } => {
                let output = next.run(operation).await?;
                if *refresh_all {
                    self.refresh_all(names).await?;
                }
                match (&output, key) {
                    (Output::List(records), None) => {
                        for record in records {
                            let Some(id) = document_id(&record.to_document()?).cloned() else {
                                continue;
                            };
                            let entry = to_document(&Output::<E, D>::Record(record.clone()))?;
                            self.put(names, &CacheKey::from_value(&id), entry).await?;
                        }
                    }
                    (_, key) => {
                        let key = match key {
                            Some(key) => key,
                            None => output
                                .id()?
                                .map(|id| CacheKey::from_value(&id))
                                .unwrap_or_else(|| CacheKey::from_arguments(&arguments)),
                        };
                        self.put(names, &key, to_document(&output)?).await?;
                    }
                }
                Ok(output)
            }
            CacheMarker::RemoveCache { refresh_all, .. } => {
                let output = next.run(operation).await?;
                for name in names {
                    match &key {
                        Some(key) => {
                            tracing::info!("evict from cache : {} in : {}", name, key);
                            self.store.evict(name, key.as_str()).await?;
                        }
                        None => {
                            tracing::info!("clear cache : {}", name);
                            self.store.clear(name).await?;
                        }
                    }
                }
                if *refresh_all {
                    self.refresh_all(names).await?;
                }
                Ok(output)
            }
        };

        ctx.method_finish(NAME);
        result
    }
}
