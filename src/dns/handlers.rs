use crate::config::DnsConfig;
use crate::error::Error;
use crate::provider::local::{RecordSet, SharedRecordTable};
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{LowerName, Name, RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

const TTL: u32 = 60;

#[derive(Clone)]
pub struct Handler {
    config: Arc<DnsConfig>,
    ns_admin: Name,
    table: SharedRecordTable,
}

/// What a query resolved to in the record table.
#[derive(Debug, PartialEq)]
enum Answer {
    Records(Vec<RData>),
    NoData,
    NxDomain,
    Refused,
}

impl Handler {
    pub(super) fn new(config: DnsConfig, table: SharedRecordTable) -> Result<Self, Error> {
        let ns_admin = config.ns_admin()?;
        Ok(Handler {
            config: Arc::new(config),
            ns_admin,
            table,
        })
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self.send_error(request, response, ResponseCode::NotImp).await;
        }

        let query = request.query();
        match self.answer(query.name(), query.query_type()).await {
            Answer::Records(rdata) => self.send_auth_resp(request, response, rdata).await,
            Answer::NoData => self.send_auth_resp(request, response, Vec::new()).await,
            Answer::NxDomain => self.send_nxdomain(request, response).await,
            Answer::Refused => {
                self.send_error(request, response, ResponseCode::Refused)
                    .await
            }
        }
    }

    async fn answer(&self, query_name: &LowerName, query_type: RecordType) -> Answer {
        let name: Name = query_name.into();
        let fqdn = name.to_ascii();
        let table = self.table.read().await;
        let Some(zone) = table.zone_of(&name) else {
            return Answer::Refused;
        };
        let is_apex = zone == fqdn;

        let rdata = match query_type {
            RecordType::SOA if is_apex => {
                let serial = table.serial(&zone).unwrap_or_default();
                vec![self.soa_rdata(&zone, serial)]
            }
            RecordType::NS => self.ns_rdata(query_name, is_apex),
            _ => match table.get(&fqdn) {
                Some(set) => Self::record_rdata(set, query_type),
                None if is_apex => Vec::new(),
                None => return Answer::NxDomain,
            },
        };
        if rdata.is_empty() {
            if is_apex || table.get(&fqdn).is_some() || !self.ns_rdata(query_name, false).is_empty()
            {
                return Answer::NoData;
            }
            return Answer::NxDomain;
        }
        Answer::Records(rdata)
    }

    fn record_rdata(set: &RecordSet, query_type: RecordType) -> Vec<RData> {
        // A CNAME owner holds no other data, so it answers every type but TXT.
        if let Some(target) = &set.cname {
            if query_type != RecordType::TXT {
                return Name::from_str(target)
                    .map(|target| vec![RData::CNAME(target)])
                    .unwrap_or_default();
            }
        }
        match query_type {
            RecordType::A => set.a.map(RData::A).into_iter().collect(),
            RecordType::AAAA => set.aaaa.map(RData::AAAA).into_iter().collect(),
            RecordType::TXT => set
                .txt
                .iter()
                .map(|s| RData::TXT(TXT::new(vec![s.to_string()])))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn soa_rdata(&self, zone: &str, serial: u32) -> RData {
        let mname = self.config.ns_domain.clone().into();
        tracing::trace!("SOA for {zone} at serial {serial}");
        // See RIPE 203[0] for recommended values.
        // [0]: https://www.ripe.net/publications/docs/ripe-203
        RData::SOA(SOA::new(
            mname,
            self.ns_admin.clone(),
            serial,
            86_400,    // 24 hrs.
            7_200,     // 2 hours.
            3_600_000, // 1000 hours.
            172_800,   // 2 days.
        ))
    }

    fn ns_rdata(&self, fqdn: &LowerName, is_apex: bool) -> Vec<RData> {
        match self.config.ns_records.get(fqdn) {
            Some(names) => names.iter().map(|n| RData::NS(n.into())).collect(),
            None if is_apex => vec![RData::NS(self.config.ns_domain.clone().into())],
            None => Vec::new(),
        }
    }

    async fn send_auth_resp<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        rdata: Vec<RData>,
    ) -> Result<ResponseInfo, Error> {
        let records: Vec<Record> = rdata
            .into_iter()
            .map(|rd| Record::from_rdata(request.query().name().into(), TTL, rd))
            .collect();
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, records.iter(), &[], &[], &[]);
        Ok(response_handle.send_response(response).await?)
    }

    async fn send_nxdomain<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_response_code(ResponseCode::NXDomain);
        let response = builder.build_no_records(header);
        Ok(response_handle.send_response(response).await?)
    }

    async fn send_error<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        code: ResponseCode,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), code))
            .await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DnsProvider, LocalProvider};
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn lower(name: &str) -> LowerName {
        LowerName::from_str(name).unwrap()
    }

    async fn handler() -> Handler {
        let provider = LocalProvider::new(&["example.com".to_string()]).unwrap();
        provider
            .set_record("www.example.com.", crate::provider::RecordType::A, "192.0.2.1")
            .await
            .unwrap();
        provider
            .set_record(
                "alias.example.com.",
                crate::provider::RecordType::CNAME,
                "www.example.com.",
            )
            .await
            .unwrap();
        provider
            .set_record(
                "_acme-challenge.www.example.com.",
                crate::provider::RecordType::TXT,
                "digest",
            )
            .await
            .unwrap();
        let config = DnsConfig {
            udp_bind_addr: "127.0.0.1:0".parse().unwrap(),
            tcp_bind_addr: "127.0.0.1:0".parse().unwrap(),
            tcp_timeout: Duration::from_secs(5),
            ns_domain: lower("ns1.example.com."),
            ns_admin: "dns-admin@example.com".to_string(),
            ns_records: HashMap::from([(
                lower("sub.example.com."),
                vec![lower("ns.elsewhere.net.")],
            )]),
        };
        Handler::new(config, provider.record_table().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn answers_address_and_txt_records() {
        let handler = handler().await;
        assert_eq!(
            handler.answer(&lower("WWW.example.com."), RecordType::A).await,
            Answer::Records(vec![RData::A(Ipv4Addr::new(192, 0, 2, 1))])
        );
        assert_eq!(
            handler
                .answer(&lower("_acme-challenge.www.example.com."), RecordType::TXT)
                .await,
            Answer::Records(vec![RData::TXT(TXT::new(vec!["digest".to_string()]))])
        );
        assert_eq!(
            handler.answer(&lower("www.example.com."), RecordType::AAAA).await,
            Answer::NoData
        );
    }

    #[tokio::test]
    async fn cname_answers_address_queries() {
        let handler = handler().await;
        assert_eq!(
            handler.answer(&lower("alias.example.com."), RecordType::A).await,
            Answer::Records(vec![RData::CNAME(
                Name::from_str("www.example.com.").unwrap()
            )])
        );
    }

    #[tokio::test]
    async fn apex_serves_soa_and_ns() {
        let handler = handler().await;
        let Answer::Records(soa) = handler.answer(&lower("example.com."), RecordType::SOA).await
        else {
            panic!("expected an SOA answer");
        };
        assert!(matches!(soa.as_slice(), [RData::SOA(_)]));
        assert_eq!(
            handler.answer(&lower("example.com."), RecordType::NS).await,
            Answer::Records(vec![RData::NS(Name::from_str("ns1.example.com.").unwrap())])
        );
        assert_eq!(
            handler.answer(&lower("sub.example.com."), RecordType::NS).await,
            Answer::Records(vec![RData::NS(Name::from_str("ns.elsewhere.net.").unwrap())])
        );
    }

    #[tokio::test]
    async fn unknown_names_and_foreign_zones() {
        let handler = handler().await;
        assert_eq!(
            handler.answer(&lower("nope.example.com."), RecordType::A).await,
            Answer::NxDomain
        );
        assert_eq!(
            handler.answer(&lower("example.org."), RecordType::A).await,
            Answer::Refused
        );
    }
}
