//! # Integration Flows
//!
//! Each test builds two or more nodes on one [`TestCluster`](crate::fixtures::TestCluster)
//! and checks behaviour that only shows up across processes.

#[cfg(test)]
mod broadcast;
#[cfg(test)]
mod locks;
#[cfg(test)]
mod ordering;
#[cfg(test)]
mod reconnect;
#[cfg(test)]
mod runtime;
