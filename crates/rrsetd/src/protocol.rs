//! Line-delimited JSON request handling
//!
//! One JSON object per input line, one JSON object per output line:
//!
//! ```text
//! {"action":"create_domain","principal":"alice","domain":"example.com"}
//! {"action":"update","principal":"alice","domain":"example.com","items":[{"subname":"www","type":"A","ttl":3600,"records":["192.0.2.1"]}]}
//! {"action":"dyndns","principal":"alice","domain":"example.com","ip":"192.0.2.7"}
//! ```
//!
//! Responses are `{"status":"ok","data":...}` or
//! `{"status":"error","kind":...,"message":...,"errors":...}`, where `errors`
//! holds the positional item errors of a rejected batch.

use rrset_core::{
    Batch, BatchErrors, BatchOperation, CheckIn, DyndnsMerger, Error, ErrorKind, Principal,
    Reconciler, RrsetFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A single request line
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    CreateDomain {
        principal: String,
        domain: String,
        #[serde(default)]
        minimum_ttl: Option<u32>,
    },
    DeleteDomain {
        principal: String,
        domain: String,
    },
    Create {
        principal: String,
        domain: String,
        #[serde(default)]
        items: Value,
    },
    Replace {
        principal: String,
        domain: String,
        #[serde(default)]
        items: Value,
    },
    Update {
        principal: String,
        domain: String,
        #[serde(default)]
        items: Value,
    },
    Get {
        principal: String,
        domain: String,
        #[serde(default)]
        subname: String,
        #[serde(rename = "type")]
        rtype: String,
    },
    List {
        principal: String,
        domain: String,
        #[serde(default)]
        subname: Option<String>,
        #[serde(default, rename = "type")]
        rtype: Option<String>,
    },
    Delete {
        principal: String,
        domain: String,
        #[serde(default)]
        subname: String,
        #[serde(rename = "type")]
        rtype: String,
    },
    Dyndns {
        /// Absent when the check-in could not be authenticated
        #[serde(default)]
        principal: Option<String>,
        domain: String,
        /// Shared by both families, split by address syntax
        #[serde(default)]
        myip: Option<String>,
        #[serde(default)]
        ip: Option<String>,
        #[serde(default)]
        ipv6: Option<String>,
    },
}

/// A single response line
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        data: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        errors: Option<BatchErrors>,
    },
}

impl Response {
    fn failure(error: &Error) -> Self {
        Response::Error {
            kind: error.kind(),
            message: error.to_string(),
            errors: error.batch_errors().cloned(),
        }
    }
}

/// Dispatches requests to the engine
pub struct Service {
    reconciler: Arc<Reconciler>,
    dyndns: DyndnsMerger,
}

impl Service {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let dyndns = DyndnsMerger::new(reconciler.clone());
        Self { reconciler, dyndns }
    }

    /// Handle one input line
    pub async fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return Response::failure(&Error::from(e)),
        };
        match self.handle(request).await {
            Ok(data) => Response::Ok { data },
            Err(e) => Response::failure(&e),
        }
    }

    async fn handle(&self, request: Request) -> rrset_core::Result<Value> {
        let reconciler = &self.reconciler;
        match request {
            Request::CreateDomain {
                principal,
                domain,
                minimum_ttl,
            } => {
                let domain = reconciler
                    .create_domain(&Principal::new(principal), &domain, minimum_ttl)
                    .await?;
                Ok(serde_json::to_value(domain)?)
            }
            Request::DeleteDomain { principal, domain } => {
                reconciler
                    .delete_domain(&Principal::new(principal), &domain)
                    .await?;
                Ok(Value::Null)
            }
            Request::Create {
                principal,
                domain,
                items,
            } => self.write(principal, domain, BatchOperation::Create, items).await,
            Request::Replace {
                principal,
                domain,
                items,
            } => self.write(principal, domain, BatchOperation::Replace, items).await,
            Request::Update {
                principal,
                domain,
                items,
            } => self.write(principal, domain, BatchOperation::Update, items).await,
            Request::Get {
                principal,
                domain,
                subname,
                rtype,
            } => {
                let view = reconciler
                    .get(&Principal::new(principal), &domain, &subname, &rtype)
                    .await?;
                Ok(serde_json::to_value(view)?)
            }
            Request::List {
                principal,
                domain,
                subname,
                rtype,
            } => {
                let filter = RrsetFilter { subname, rtype };
                let views = reconciler
                    .list(&Principal::new(principal), &domain, &filter)
                    .await?;
                Ok(serde_json::to_value(views)?)
            }
            Request::Delete {
                principal,
                domain,
                subname,
                rtype,
            } => {
                let removed = reconciler
                    .delete(&Principal::new(principal), &domain, &subname, &rtype)
                    .await?;
                Ok(Value::Bool(removed))
            }
            Request::Dyndns {
                principal,
                domain,
                myip,
                ip,
                ipv6,
            } => {
                let principal = principal.map(Principal::new);
                let check_in = CheckIn {
                    myip,
                    ipv4: ip,
                    ipv6,
                };
                let status = self
                    .dyndns
                    .apply_check_in(principal.as_ref(), &domain, &check_in)
                    .await;
                Ok(serde_json::to_value(status)?)
            }
        }
    }

    async fn write(
        &self,
        principal: String,
        domain: String,
        operation: BatchOperation,
        items: Value,
    ) -> rrset_core::Result<Value> {
        let batch = Batch::from_json(&items).map_err(Error::Rejected)?;
        let outcome = self
            .reconciler
            .apply(&Principal::new(principal), &domain, operation, batch)
            .await?;
        Ok(serde_json::to_value(outcome)?)
    }
}
