//! Broker side of the forwarder
//!
//! The forwarder only needs three things from a broker connection: publish
//! a payload, keep the connection alive while idle, and say goodbye.

pub mod mqtt;

pub use mqtt::MqttSession;

use rumqttc::ConnectReturnCode;
use std::time::Duration;

/// Broker failure kinds
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker answered CONNECT with a non-success code
    #[error("Broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),

    /// No answer within the allowed time
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Network or protocol failure on the connection
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Request could not be queued
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The connection went away
    #[error("Broker connection closed")]
    Closed,
}

/// Outbound side of the forwarder
pub trait Publisher {
    /// Publish one payload and block until it has been handed to the network
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Housekeeping while no readings arrive (keep-alive pings)
    fn service(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Close the session
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Human readable description for status output
    fn describe(&self) -> String;
}

impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        (**self).publish(topic, payload)
    }

    fn service(&mut self) -> Result<(), BrokerError> {
        (**self).service()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        (**self).disconnect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
