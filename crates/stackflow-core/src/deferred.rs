//! Deferred values
//!
//! A `DeferredValue<T>` stands for a value that only exists once some
//! producer (usually a resource creation) has completed. Declarations never
//! wait on one; they derive new deferred values with `map`, `zip` and the
//! `combine*` family, and hand them to resources as inputs.
//!
//! # How resolution works
//!
//! Every deferred value wraps a shared future. A derived value's future
//! awaits its parents and then runs its transform, so:
//!
//! 1. A transform runs at most once per node, no matter how many consumers
//!    observe the result (the shared future caches its output).
//! 2. A combined value resolves only after every input resolved.
//! 3. A failed producer fails every value derived from it.
//!
//! Each value also carries the set of resources it was derived from and a
//! sensitivity flag. Both are unions/ORs over the inputs, and sensitivity can
//! only be raised, never cleared.

use crate::resource::ResourceId;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Outcome of resolving a deferred value.
pub type Resolution<T> = std::result::Result<T, Failure>;

/// Why a deferred value could not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("resource '{0}' did not complete")]
    Upstream(ResourceId),

    #[error("resource '{resource}' has no attribute '{attribute}'")]
    MissingAttribute {
        resource: ResourceId,
        attribute: String,
    },

    #[error("attribute '{attribute}' of '{resource}' is invalid: {reason}")]
    InvalidAttribute {
        resource: ResourceId,
        attribute: String,
        reason: String,
    },
}

/// A value that becomes available once its producers resolve.
pub struct DeferredValue<T> {
    future: Shared<BoxFuture<'static, Resolution<T>>>,
    dependencies: Arc<BTreeSet<ResourceId>>,
    sensitive: bool,
}

impl<T> Clone for DeferredValue<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            dependencies: Arc::clone(&self.dependencies),
            sensitive: self.sensitive,
        }
    }
}

impl<T> fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("dependencies", &self.dependencies)
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

impl<T> DeferredValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_future<F>(future: F, dependencies: BTreeSet<ResourceId>, sensitive: bool) -> Self
    where
        F: Future<Output = Resolution<T>> + Send + 'static,
    {
        Self {
            future: future.boxed().shared(),
            dependencies: Arc::new(dependencies),
            sensitive,
        }
    }

    /// A value already known at declaration time.
    pub fn known(value: T) -> Self {
        Self::from_future(future::ready(Ok(value)), BTreeSet::new(), false)
    }

    /// A known value that must never be shown.
    pub fn secret(value: T) -> Self {
        Self::known(value).mark_sensitive()
    }

    /// A value produced by `producer` at apply time.
    ///
    /// The returned `Resolver` is the single producer handle. Dropping it
    /// without resolving fails every consumer with `Failure::Upstream`.
    pub fn pending(producer: ResourceId) -> (Self, Resolver<T>) {
        let (sender, receiver) = oneshot::channel::<Resolution<T>>();
        let failed = producer.clone();
        let future = receiver.map(move |received| match received {
            Ok(resolution) => resolution,
            Err(_) => Err(Failure::Upstream(failed)),
        });

        let mut dependencies = BTreeSet::new();
        dependencies.insert(producer.clone());

        let value = Self::from_future(future, dependencies, false);
        (value, Resolver { producer, sender })
    }

    /// Tag the value as sensitive. There is no inverse operation.
    pub fn mark_sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Resources this value was (transitively) derived from.
    pub fn dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.dependencies
    }

    /// Apply a pure transform once the value resolves.
    pub fn map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let parent = self.future.clone();
        DeferredValue::from_future(
            async move { parent.await.map(f) },
            (*self.dependencies).clone(),
            self.sensitive,
        )
    }

    /// Like `map`, for projections that can fail (attribute extraction).
    pub(crate) fn try_map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
    {
        let parent = self.future.clone();
        DeferredValue::from_future(
            async move { parent.await.and_then(f) },
            (*self.dependencies).clone(),
            self.sensitive,
        )
    }

    /// Pair this value with another; resolves once both do.
    pub fn zip<U>(&self, other: &DeferredValue<U>) -> DeferredValue<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let left = self.future.clone();
        let right = other.future.clone();
        let dependencies = union(&[self.dependencies.as_ref(), other.dependencies.as_ref()]);
        DeferredValue::from_future(
            async move {
                let (left, right) = future::join(left, right).await;
                Ok::<_, Failure>((left?, right?))
            },
            dependencies,
            self.sensitive || other.sensitive,
        )
    }

    /// Join two values through a pure binary function.
    pub fn combine2<A, B, F>(a: &DeferredValue<A>, b: &DeferredValue<B>, f: F) -> DeferredValue<T>
    where
        A: Clone + Send + Sync + 'static,
        B: Clone + Send + Sync + 'static,
        F: FnOnce(A, B) -> T + Send + 'static,
    {
        a.zip(b).map(move |(a, b)| f(a, b))
    }

    /// Join three values through a pure ternary function.
    pub fn combine3<A, B, C, F>(
        a: &DeferredValue<A>,
        b: &DeferredValue<B>,
        c: &DeferredValue<C>,
        f: F,
    ) -> DeferredValue<T>
    where
        A: Clone + Send + Sync + 'static,
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: FnOnce(A, B, C) -> T + Send + 'static,
    {
        a.zip(b).zip(c).map(move |((a, b), c)| f(a, b, c))
    }

    /// Collect N values of the same type; resolves once all of them do.
    pub fn all(values: &[DeferredValue<T>]) -> DeferredValue<Vec<T>> {
        let futures: Vec<_> = values.iter().map(|v| v.future.clone()).collect();
        let dependencies = union(
            &values
                .iter()
                .map(|v| v.dependencies.as_ref())
                .collect::<Vec<_>>(),
        );
        let sensitive = values.iter().any(|v| v.sensitive);
        DeferredValue::from_future(
            async move {
                future::join_all(futures)
                    .await
                    .into_iter()
                    .collect::<Resolution<Vec<T>>>()
            },
            dependencies,
            sensitive,
        )
    }

    /// Join N values through a pure N-ary function.
    pub fn combine_all<U, F>(values: &[DeferredValue<T>], f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(Vec<T>) -> U + Send + 'static,
    {
        Self::all(values).map(f)
    }

    /// Wait for the value. Only the orchestrator boundary and the executor
    /// call this; declarations never do.
    pub async fn resolve(&self) -> Resolution<T> {
        self.future.clone().await
    }

    /// Observe the value without suspending; `None` while unresolved.
    ///
    /// Polled outside the runtime's cooperative budget, so a chain whose
    /// producers have all resolved is never reported as pending.
    pub fn peek(&self) -> Option<Resolution<T>> {
        tokio::task::unconstrained(self.future.clone()).now_or_never()
    }
}

fn union(sets: &[&BTreeSet<ResourceId>]) -> BTreeSet<ResourceId> {
    sets.iter().flat_map(|set| set.iter().cloned()).collect()
}

/// The producer side of a pending `DeferredValue`.
pub struct Resolver<T> {
    producer: ResourceId,
    sender: oneshot::Sender<Resolution<T>>,
}

impl<T> Resolver<T> {
    pub fn producer(&self) -> &ResourceId {
        &self.producer
    }

    pub fn resolve(self, value: T) {
        // A send error only means nobody consumes the value.
        let _ = self.sender.send(Ok(value));
    }

    pub fn fail(self) {
        let producer = self.producer.clone();
        let _ = self.sender.send(Err(Failure::Upstream(producer)));
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("producer", &self.producer)
            .finish_non_exhaustive()
    }
}

/// A piece of an interpolated string.
#[derive(Debug, Clone)]
pub enum Fragment {
    Text(String),
    Value(DeferredValue<String>),
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Fragment::Text(text.to_string())
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::Text(text)
    }
}

impl From<DeferredValue<String>> for Fragment {
    fn from(value: DeferredValue<String>) -> Self {
        Fragment::Value(value)
    }
}

impl From<&DeferredValue<String>> for Fragment {
    fn from(value: &DeferredValue<String>) -> Self {
        Fragment::Value(value.clone())
    }
}

/// Interpolate literal text and deferred strings into one deferred string.
pub fn concat(parts: Vec<Fragment>) -> DeferredValue<String> {
    let mut values = Vec::new();
    let mut template = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Fragment::Text(text) => template.push(Some(text)),
            Fragment::Value(value) => {
                values.push(value);
                template.push(None);
            }
        }
    }

    DeferredValue::combine_all(values.as_slice(), move |resolved| {
        let mut resolved = resolved.into_iter();
        let mut out = String::new();
        for slot in template {
            match slot {
                Some(text) => out.push_str(&text),
                None => {
                    if let Some(value) = resolved.next() {
                        out.push_str(&value);
                    }
                }
            }
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(name: &str) -> ResourceId {
        ResourceId::from(name)
    }

    #[tokio::test]
    async fn test_known_value_resolves_immediately() {
        let value = DeferredValue::known(42u16);
        assert_eq!(value.peek(), Some(Ok(42)));
        assert!(value.dependencies().is_empty());
        assert!(!value.is_sensitive());
    }

    #[tokio::test]
    async fn test_pending_value_waits_for_resolver() {
        let (value, resolver) = DeferredValue::<String>::pending(id("vpc"));
        assert!(value.peek().is_none());

        resolver.resolve("vpc-123".to_string());
        assert_eq!(value.resolve().await, Ok("vpc-123".to_string()));
        assert!(value.dependencies().contains(&id("vpc")));
    }

    #[tokio::test]
    async fn test_dropped_resolver_fails_consumers() {
        let (value, resolver) = DeferredValue::<String>::pending(id("cluster"));
        let derived = value.map(|arn| format!("{}/role", arn));
        drop(resolver);

        assert_eq!(derived.resolve().await, Err(Failure::Upstream(id("cluster"))));
    }

    #[tokio::test]
    async fn test_map_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (value, resolver) = DeferredValue::<u32>::pending(id("a"));

        let counter = Arc::clone(&calls);
        let doubled = value.map(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v * 2
        });
        let first = doubled.clone();
        let second = doubled.clone();

        resolver.resolve(21);
        assert_eq!(first.resolve().await, Ok(42));
        assert_eq!(second.resolve().await, Ok(42));
        assert_eq!(doubled.peek(), Some(Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_map_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _unused = DeferredValue::known(1u32).map(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_combine_waits_for_every_input() {
        let (a, resolve_a) = DeferredValue::<String>::pending(id("a"));
        let (b, resolve_b) = DeferredValue::<String>::pending(id("b"));
        let (c, resolve_c) = DeferredValue::<String>::pending(id("c"));

        let joined = DeferredValue::combine_all(&[a, b, c], |parts| parts.join(","));

        // Resolve out of declaration order.
        resolve_c.resolve("3".to_string());
        assert!(joined.peek().is_none());
        resolve_a.resolve("1".to_string());
        assert!(joined.peek().is_none());
        resolve_b.resolve("2".to_string());

        assert_eq!(joined.peek(), Some(Ok("1,2,3".to_string())));
        assert_eq!(joined.dependencies().len(), 3);
    }

    #[tokio::test]
    async fn test_combine_propagates_sensitivity() {
        let secret = DeferredValue::known("s3cr3t".to_string()).mark_sensitive();
        let plain = DeferredValue::known("user".to_string());

        let joined = DeferredValue::combine2(&plain, &secret, |u, p| format!("{}:{}", u, p));
        assert!(joined.is_sensitive());

        let mapped = joined.map(|s| s.len());
        assert!(mapped.is_sensitive());

        let plain_only = DeferredValue::combine2(&plain, &plain, |a, b| a + &b);
        assert!(!plain_only.is_sensitive());
    }

    #[tokio::test]
    async fn test_combine3_unions_dependencies() {
        let (host, r1) = DeferredValue::<String>::pending(id("db"));
        let (port, r2) = DeferredValue::<u16>::pending(id("db"));
        let (name, r3) = DeferredValue::<String>::pending(id("config"));

        let url = DeferredValue::combine3(&host, &port, &name, |h, p, n| {
            format!("{}:{}/{}", h, p, n)
        });
        let deps: Vec<_> = url.dependencies().iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["config", "db"]);

        r1.resolve("localhost".to_string());
        r2.resolve(5432);
        r3.resolve("lago".to_string());
        assert_eq!(url.resolve().await, Ok("localhost:5432/lago".to_string()));
    }

    #[tokio::test]
    async fn test_failed_input_fails_combination() {
        let (a, resolve_a) = DeferredValue::<String>::pending(id("a"));
        let (b, resolve_b) = DeferredValue::<String>::pending(id("b"));
        let joined = DeferredValue::combine2(&a, &b, |a, b| a + &b);

        resolve_a.resolve("ok".to_string());
        resolve_b.fail();
        assert_eq!(joined.resolve().await, Err(Failure::Upstream(id("b"))));
    }

    #[tokio::test]
    async fn test_concat_interpolates_fragments() {
        let (dns, resolver) = DeferredValue::<String>::pending(id("alb"));
        let url = concat(vec!["http://".into(), (&dns).into(), "/api".into()]);

        assert!(url.peek().is_none());
        resolver.resolve("lb-1.elb.amazonaws.com".to_string());
        assert_eq!(
            url.resolve().await,
            Ok("http://lb-1.elb.amazonaws.com/api".to_string())
        );
    }

    #[tokio::test]
    async fn test_concurrent_producers_resolve_combination() {
        let (a, resolve_a) = DeferredValue::<u32>::pending(id("a"));
        let (b, resolve_b) = DeferredValue::<u32>::pending(id("b"));
        let sum = DeferredValue::combine2(&a, &b, |a, b| a + b);

        let waiter = tokio::spawn({
            let sum = sum.clone();
            async move { sum.resolve().await }
        });
        tokio::spawn(async move { resolve_b.resolve(2) });
        tokio::spawn(async move { resolve_a.resolve(40) });

        assert_eq!(waiter.await.unwrap(), Ok(42));
    }

    #[test]
    fn test_resolver_wakes_waiting_consumer() {
        let (host, resolve_host) = DeferredValue::<String>::pending(id("db"));
        let (port, resolve_port) = DeferredValue::<u16>::pending(id("db"));
        let address = DeferredValue::combine2(&host, &port, |h, p| format!("{}:{}", h, p));

        let mut waiting = tokio_test::task::spawn(address.resolve());
        tokio_test::assert_pending!(waiting.poll());

        resolve_host.resolve("db.internal".to_string());
        tokio_test::assert_pending!(waiting.poll());

        resolve_port.resolve(5432);
        assert!(waiting.is_woken());
        tokio_test::assert_ready_eq!(waiting.poll(), Ok("db.internal:5432".to_string()));
    }

    #[test]
    fn test_debug_never_prints_values() {
        let secret = DeferredValue::known("hunter2".to_string()).mark_sensitive();
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("sensitive: true"));
    }
}
