//! Subtree walk built on GETBULK/GETNEXT.

use super::Session;
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::transport::Transport;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

impl<T: Transport> Session<T> {
    /// Collect every binding under `root`.
    ///
    /// Uses GETBULK on v2c/v3 and GETNEXT on v1. Results outside the
    /// subtree and trailing end-of-view markers are filtered out, so an
    /// empty vector means the subtree holds nothing.
    ///
    /// An agent answering `tooBig` makes the walk halve the session's
    /// max-repetitions and retry; the reduced value sticks for later
    /// walks, since asking again with the original size would fail the
    /// same way.
    pub async fn walk(&self, root: &Oid) -> Result<Vec<VarBind>> {
        root.validate_length()?;

        let mut results: Vec<VarBind> = Vec::new();
        let mut cursor = root.clone();

        loop {
            let use_bulk = self.version() != Version::V1;

            let batch = if use_bulk {
                let (_, max_repetitions) = self.bulk();
                match self
                    .get_bulk(std::slice::from_ref(&cursor), 0, max_repetitions)
                    .await
                {
                    Ok(batch) => batch,
                    Err(Error::Protocol {
                        status: ErrorStatus::TooBig,
                        ..
                    }) if max_repetitions > 1 => {
                        let reduced = max_repetitions / 2;
                        tracing::debug!(
                            target: "snmp_session::session",
                            snmp.peer = %self.peer_addr(),
                            snmp.max_repetitions = reduced,
                            "agent answered tooBig; halving bulk size"
                        );
                        self.set_bulk(0, reduced)?;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                match self.get_next(std::slice::from_ref(&cursor)).await {
                    Ok(batch) => batch,
                    // v1 agents end a walk with noSuchName; v2c+ with the
                    // end-of-view sentinel
                    Err(Error::Protocol {
                        status: ErrorStatus::NoSuchName,
                        ..
                    })
                    | Err(Error::EndOfMibView { .. }) => break,
                    Err(e) => return Err(e),
                }
            };

            if batch.is_empty() {
                break;
            }

            let mut done = false;
            for vb in batch {
                if matches!(vb.value, Value::EndOfMibView) {
                    done = true;
                    break;
                }
                if !vb.oid.starts_with(root) {
                    done = true;
                    break;
                }
                if vb.oid <= cursor {
                    tracing::warn!(
                        target: "snmp_session::session",
                        snmp.peer = %self.peer_addr(),
                        snmp.oid = %vb.oid,
                        "agent returned a non-increasing OID; stopping walk"
                    );
                    done = true;
                    break;
                }
                cursor = vb.oid.clone();
                results.push(vb);
            }

            if done {
                break;
            }
        }

        Ok(results)
    }
}
