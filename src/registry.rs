//! The connection registry - named connections with a single active slot.

use crate::{
    gateway::{DbConnection, Driver},
    library::{DbLibError, Result},
    observer::Observer,
};
use indexmap::IndexMap;
use std::fmt;

/// Connections stored by their (case-sensitive) names, in the order they were opened, along with
/// the name of the active one. The active name, when set, is always a key of the map.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: IndexMap<String, Box<dyn DbConnection>>,
    active: Option<String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection using the given driver, store it under `name` and make it active.
    pub fn connect(
        &mut self,
        name: &str,
        driver: &dyn Driver,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(DbLibError::ConfigError(
                "A connection name is required".to_string(),
            ));
        }
        if self.connections.contains_key(name) {
            return Err(DbLibError::AlreadyRegistered(name.to_string()));
        }

        let conn = driver.open(url, user, password)?;
        log::debug!("Registered connection '{}' using driver {}", name, driver.name());
        self.connections.insert(name.to_string(), conn);
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn switch_active(&mut self, name: &str) -> Result<()> {
        if !self.connections.contains_key(name) {
            return Err(DbLibError::UnknownConnection(name.to_string()));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Remove the active connection from the registry, report its warnings and close it.
    pub fn disconnect_active(&mut self, observer: &Observer) -> Result<()> {
        let name = self.active.take().ok_or(DbLibError::NoActiveConnection)?;
        let conn = self
            .connections
            .shift_remove(&name)
            .ok_or(DbLibError::NoActiveConnection)?;
        observer.emit(&format!(
            "SQL Warnings on current connection: {}",
            format_warnings(conn.warnings())
        ));
        conn.close()
    }

    /// Close every registered connection. Closing continues past failures; the first one is
    /// returned once all connections have been dealt with.
    pub fn disconnect_all(&mut self, observer: &Observer) -> Result<()> {
        self.active = None;
        let mut first_error = None;
        for (name, conn) in self.connections.drain(..) {
            observer.emit(&format!(
                "SQL Warnings on {} connection: {}",
                name,
                format_warnings(conn.warnings())
            ));
            if let Err(e) = conn.close() {
                log::warn!("Error closing connection '{}': {}", name, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    pub fn active(&mut self) -> Result<&mut dyn DbConnection> {
        let name = self.active.as_ref().ok_or(DbLibError::NoActiveConnection)?;
        match self.connections.get_mut(name) {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(DbLibError::NoActiveConnection),
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The names of the registered connections, in the order they were opened.
    pub fn names(&self) -> Vec<&str> {
        self.connections.keys().map(|k| k.as_str()).collect()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.names())
            .field("active", &self.active_name())
            .finish()
    }
}

fn format_warnings(warnings: Vec<String>) -> String {
    if warnings.is_empty() {
        "none".to_string()
    } else {
        warnings.join("; ")
    }
}
