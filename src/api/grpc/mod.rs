use std::pin::Pin;
use std::sync::Arc;

use futures::stream;
use tokio_stream::Stream;
use tonic::metadata::MetadataMap;
use tonic::{Code, Request, Response, Status};
use tracing::debug;
use uuid::Uuid;

use crate::api::auth::{principal_from_values, PRINCIPAL_ID_HEADER, PRINCIPAL_ROLE_HEADER};
use crate::error::AppError;
use crate::hub::{AttachRefusal, ConnectionId, ObserverEvent, PositionHub};
use crate::models::bid::Bid;
use crate::models::delivery::{self, Delivery, DeliveryId, DeliveryStatus, NewDelivery};
use crate::models::position::PositionSample;
use crate::models::principal::Principal;
use crate::state::AppState;

pub mod pb {
    include!("generated/dispatch.v1.rs");
}

use pb::dispatch_service_server::DispatchService;
use pb::{
    AcceptBidRequest, AdvanceStatusRequest, AssignCourierRequest, CreateDeliveryRequest,
    GeoPoint, GetDeliveryRequest, ListDeliveriesResponse, ListOpenDeliveriesRequest, LiveEvent,
    PositionEvent, PublishPositionRequest, Stop, SubmitBidRequest, WatchPositionsRequest,
};

#[derive(Clone)]
pub struct GrpcDispatchService {
    state: Arc<AppState>,
}

impl GrpcDispatchService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::NotFound(_) => Code::NotFound,
            AppError::Permission(_) => Code::PermissionDenied,
            AppError::Conflict(_) | AppError::InvalidTransition(_) => Code::FailedPrecondition,
            AppError::Validation(_) => Code::InvalidArgument,
            AppError::Unauthenticated(_) => Code::Unauthenticated,
            AppError::Store(_) | AppError::Internal(_) => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}

fn refusal_to_status(refusal: AttachRefusal) -> Status {
    let code = match refusal {
        AttachRefusal::NotFound => Code::NotFound,
        AttachRefusal::Forbidden => Code::PermissionDenied,
        AttachRefusal::Inactive => Code::FailedPrecondition,
        AttachRefusal::Unavailable => Code::Unavailable,
    };
    Status::new(code, refusal.to_string())
}

fn principal_from_metadata(metadata: &MetadataMap) -> Result<Principal, Status> {
    principal_from_values(
        metadata_value(metadata, PRINCIPAL_ID_HEADER),
        metadata_value(metadata, PRINCIPAL_ROLE_HEADER),
    )
    .map_err(Status::from)
}

fn metadata_value<'a>(metadata: &'a MetadataMap, name: &str) -> Option<&'a str> {
    metadata.get(name).and_then(|value| value.to_str().ok())
}

fn point_to_proto(point: &delivery::GeoPoint) -> GeoPoint {
    GeoPoint {
        lat: point.lat,
        lng: point.lng,
    }
}

fn point_from_proto(point: Option<GeoPoint>, field: &str) -> Result<delivery::GeoPoint, Status> {
    let point = point.ok_or_else(|| Status::invalid_argument(format!("{field} is required")))?;
    Ok(delivery::GeoPoint {
        lat: point.lat,
        lng: point.lng,
    })
}

fn stop_to_proto(stop: &delivery::Stop) -> Stop {
    Stop {
        location: Some(point_to_proto(&stop.location)),
        address: stop.address.clone(),
    }
}

fn stop_from_proto(stop: Option<Stop>, field: &str) -> Result<delivery::Stop, Status> {
    let stop = stop.ok_or_else(|| Status::invalid_argument(format!("{field} is required")))?;
    Ok(delivery::Stop {
        location: point_from_proto(stop.location, &format!("{field}.location"))?,
        address: stop.address,
    })
}

fn delivery_to_proto(d: &Delivery) -> pb::Delivery {
    pb::Delivery {
        id: d.id,
        client_id: d.client_id.to_string(),
        courier_id: d.courier_id.map(|id| id.to_string()),
        pickup: Some(stop_to_proto(&d.pickup)),
        dropoff: Some(stop_to_proto(&d.dropoff)),
        proposed_price: d.proposed_price,
        final_price: d.final_price,
        status: d.status.as_str().to_string(),
        distance_km: d.route.distance_km,
        duration_secs: d.route.duration_secs,
        created_at: d.created_at.to_rfc3339(),
        updated_at: d.updated_at.to_rfc3339(),
    }
}

fn bid_to_proto(b: &Bid) -> pb::Bid {
    pb::Bid {
        id: b.id,
        delivery_id: b.delivery_id,
        courier_id: b.courier_id.to_string(),
        amount: b.amount,
        note: b.note.clone(),
        status: b.status.as_str().to_string(),
        updated_at: b.updated_at.to_rfc3339(),
    }
}

fn position_to_proto(sample: &PositionSample) -> PositionEvent {
    PositionEvent {
        delivery_id: sample.delivery_id,
        position: Some(point_to_proto(&sample.point())),
        recorded_at: sample.recorded_at.to_rfc3339(),
    }
}

/// Releases the hub connection once tonic drops the response stream.
struct ReleaseOnDrop {
    hub: Arc<PositionHub>,
    delivery_id: DeliveryId,
    connection_id: ConnectionId,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let (delivery_id, connection_id) = (self.delivery_id, self.connection_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if hub.release(delivery_id, connection_id).await {
                    debug!(delivery_id, %connection_id, "grpc watcher released");
                }
            });
        }
    }
}

#[tonic::async_trait]
impl DispatchService for GrpcDispatchService {
    async fn create_delivery(
        &self,
        request: Request<CreateDeliveryRequest>,
    ) -> Result<Response<pb::Delivery>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();

        let job = NewDelivery {
            pickup: stop_from_proto(req.pickup, "pickup")?,
            dropoff: stop_from_proto(req.dropoff, "dropoff")?,
            proposed_price: req.proposed_price,
        };

        let delivery = self.state.dispatcher.create(&principal, job).await?;
        Ok(Response::new(delivery_to_proto(&delivery)))
    }

    async fn get_delivery(
        &self,
        request: Request<GetDeliveryRequest>,
    ) -> Result<Response<pb::Delivery>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let delivery_id = request.into_inner().delivery_id;

        let delivery = self
            .state
            .dispatcher
            .get_delivery(delivery_id, &principal)
            .await?;
        Ok(Response::new(delivery_to_proto(&delivery)))
    }

    async fn list_open_deliveries(
        &self,
        request: Request<ListOpenDeliveriesRequest>,
    ) -> Result<Response<ListDeliveriesResponse>, Status> {
        let principal = principal_from_metadata(request.metadata())?;

        let deliveries = self.state.dispatcher.list_open(&principal).await?;
        Ok(Response::new(ListDeliveriesResponse {
            deliveries: deliveries.iter().map(delivery_to_proto).collect(),
        }))
    }

    async fn submit_bid(
        &self,
        request: Request<SubmitBidRequest>,
    ) -> Result<Response<pb::Bid>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();

        let bid = self
            .state
            .dispatcher
            .submit_bid(req.delivery_id, &principal, req.amount, req.note)
            .await?;
        Ok(Response::new(bid_to_proto(&bid)))
    }

    async fn accept_bid(
        &self,
        request: Request<AcceptBidRequest>,
    ) -> Result<Response<pb::Delivery>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();

        let delivery = self
            .state
            .dispatcher
            .accept_bid(req.delivery_id, req.bid_id, &principal)
            .await?;
        Ok(Response::new(delivery_to_proto(&delivery)))
    }

    async fn assign_courier(
        &self,
        request: Request<AssignCourierRequest>,
    ) -> Result<Response<pb::Delivery>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();

        let courier_id = Uuid::parse_str(&req.courier_id)
            .map_err(|err| Status::invalid_argument(format!("invalid courier_id: {err}")))?;

        let delivery = self
            .state
            .dispatcher
            .assign_courier(req.delivery_id, courier_id, req.price, &principal)
            .await?;
        Ok(Response::new(delivery_to_proto(&delivery)))
    }

    async fn advance_status(
        &self,
        request: Request<AdvanceStatusRequest>,
    ) -> Result<Response<pb::Delivery>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();

        let target = req
            .status
            .parse::<DeliveryStatus>()
            .map_err(Status::invalid_argument)?;

        let delivery = self
            .state
            .dispatcher
            .advance_status(req.delivery_id, target, &principal)
            .await?;
        Ok(Response::new(delivery_to_proto(&delivery)))
    }

    async fn publish_position(
        &self,
        request: Request<PublishPositionRequest>,
    ) -> Result<Response<PositionEvent>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let req = request.into_inner();
        let point = point_from_proto(req.position, "position")?;

        let sample = self
            .state
            .hub
            .publish_position(req.delivery_id, &principal, point)
            .await?;
        Ok(Response::new(position_to_proto(&sample)))
    }

    type WatchPositionsStream = Pin<Box<dyn Stream<Item = Result<LiveEvent, Status>> + Send>>;

    async fn watch_positions(
        &self,
        request: Request<WatchPositionsRequest>,
    ) -> Result<Response<Self::WatchPositionsStream>, Status> {
        let principal = principal_from_metadata(request.metadata())?;
        let delivery_id = request.into_inner().delivery_id;

        let subscription = self
            .state
            .hub
            .attach(delivery_id, principal)
            .await
            .map_err(refusal_to_status)?;

        let guard = ReleaseOnDrop {
            hub: self.state.hub.clone(),
            delivery_id,
            connection_id: subscription.connection_id,
        };

        // A probe is answered as soon as the stream is polled for it: a peer that stops reading
        // leaves it queued until the sweep gives up.
        let stream = stream::unfold(Some((subscription, guard)), |next| async move {
            let (mut subscription, guard) = next?;
            loop {
                match subscription.recv().await? {
                    ObserverEvent::Position(sample) => {
                        let event = LiveEvent {
                            position: Some(position_to_proto(&sample)),
                            closed_reason: String::new(),
                        };
                        return Some((Ok(event), Some((subscription, guard))));
                    }
                    ObserverEvent::Probe(ack) => {
                        let _ = ack.send(());
                    }
                    ObserverEvent::Closed(reason) => {
                        let event = LiveEvent {
                            position: None,
                            closed_reason: reason.as_str().to_string(),
                        };
                        return Some((Ok(event), None));
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
