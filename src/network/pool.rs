//! Address-keyed pool of shared broker connections. Concurrent callers of
//! `get` for the same address are coalesced: the first one dials, the rest
//! wait on the same outcome.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::errors::{Error, ErrorKind, Result};
use crate::network::conn::{ConnectOptions, KafkaConnection};

enum PoolEntry {
    Ready(KafkaConnection),
    /// A dial is in progress; everyone else parks a waiter here.
    Connecting(Vec<oneshot::Sender<Result<KafkaConnection>>>),
}

struct PoolInner {
    options: ConnectOptions,
    conns: Mutex<HashMap<SocketAddr, PoolEntry>>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct KafkaConnPool {
    inner: Arc<PoolInner>,
}

impl KafkaConnPool {
    pub fn new(options: ConnectOptions) -> Self {
        KafkaConnPool {
            inner: Arc::new(PoolInner {
                options,
                conns: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A ready connection for the address, dialing if necessary.
    pub async fn get(&self, host: &str, addr: SocketAddr) -> Result<KafkaConnection> {
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                bail!(ErrorKind::ClientClosed("connection pool closed".into()));
            }

            let waiter = {
                let mut conns = self.inner.conns.lock().unwrap();
                match conns.get_mut(&addr) {
                    Some(PoolEntry::Ready(conn)) if !conn.is_closed() => {
                        return Ok(conn.clone());
                    }
                    Some(PoolEntry::Ready(_)) => {
                        conns.remove(&addr);
                        conns.insert(addr, PoolEntry::Connecting(Vec::new()));
                        None
                    }
                    Some(PoolEntry::Connecting(waiters)) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Some(rx)
                    }
                    None => {
                        conns.insert(addr, PoolEntry::Connecting(Vec::new()));
                        None
                    }
                }
            };

            if let Some(rx) = waiter {
                match rx.await {
                    Ok(result) => return result,
                    // the dialer was dropped; start over
                    Err(_) => continue,
                }
            }

            let result = KafkaConnection::connect(host, addr, self.inner.options.clone()).await;

            let waiters = {
                let mut conns = self.inner.conns.lock().unwrap();
                let waiters = match conns.remove(&addr) {
                    Some(PoolEntry::Connecting(waiters)) => waiters,
                    _ => Vec::new(),
                };
                if let Ok(conn) = &result {
                    conns.insert(addr, PoolEntry::Ready(conn.clone()));
                }
                waiters
            };

            for waiter in waiters {
                let _ = waiter.send(match &result {
                    Ok(conn) => Ok(conn.clone()),
                    Err(err) => Err(Error::from(format!("connect to {} failed, {}", addr, err))),
                });
            }

            return result;
        }
    }

    /// Try brokers in order until one connects; aggregate all failures
    /// otherwise.
    pub async fn get_first_available(
        &self,
        brokers: &[(String, SocketAddr)],
    ) -> Result<KafkaConnection> {
        let mut errors = Vec::new();

        for (host, addr) in brokers {
            match self.get(host, *addr).await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    warn!("broker @ {} unavailable, {}", addr, err);
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            bail!(ErrorKind::NoBrokerAvailable);
        }
        bail!(ErrorKind::MultipleErrors(errors))
    }

    /// True iff any pooled connection is ready.
    pub fn is_connected(&self) -> bool {
        self.inner
            .conns
            .lock()
            .unwrap()
            .values()
            .any(|entry| matches!(entry, PoolEntry::Ready(conn) if conn.is_ready()))
    }

    /// In-flight request count for an address, used for least-loaded broker
    /// selection.
    pub fn in_flight_requests(&self, addr: &SocketAddr) -> Option<usize> {
        match self.inner.conns.lock().unwrap().get(addr) {
            Some(PoolEntry::Ready(conn)) if !conn.is_closed() => {
                Some(conn.in_flight_requests())
            }
            _ => None,
        }
    }

    /// Drop a connection that turned out to be broken.
    pub fn remove(&self, addr: &SocketAddr) {
        let mut conns = self.inner.conns.lock().unwrap();
        if let Some(PoolEntry::Ready(conn)) = conns.get(addr) {
            conn.close("removed from pool");
            conns.remove(addr);
        }
    }

    /// Close every connection. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut conns = self.inner.conns.lock().unwrap();
        for (_, entry) in conns.drain() {
            match entry {
                PoolEntry::Ready(conn) => conn.close("pool closed"),
                PoolEntry::Connecting(waiters) => {
                    for waiter in waiters {
                        let _ = waiter.send(Err(ErrorKind::ClientClosed(
                            "connection pool closed".into(),
                        )
                        .into()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_close_is_idempotent() {
        let pool = KafkaConnPool::new(ConnectOptions::default());
        pool.close();
        pool.close();
        assert!(!pool.is_connected());
    }

    #[tokio::test]
    async fn test_pool_rejects_after_close() {
        let pool = KafkaConnPool::new(ConnectOptions::default());
        pool.close();

        let addr: SocketAddr = "127.0.0.1:9092".parse().unwrap();
        let err = pool.get("localhost", addr).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientClosed(_)));
    }

    #[tokio::test]
    async fn test_first_available_aggregates_errors() {
        let pool = KafkaConnPool::new(ConnectOptions {
            connect_timeout: std::time::Duration::from_millis(50),
            ..ConnectOptions::default()
        });

        // nothing listens on these ports
        let brokers = vec![
            ("localhost".to_owned(), "127.0.0.1:1".parse().unwrap()),
            ("localhost".to_owned(), "127.0.0.1:2".parse().unwrap()),
        ];

        let err = pool.get_first_available(&brokers).await.unwrap_err();
        match err.kind() {
            ErrorKind::MultipleErrors(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
