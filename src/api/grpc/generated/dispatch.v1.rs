// @generated
// Generated from: proto/dispatch/v1/dispatch.proto
// Manual check-in for offline builds.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeoPoint {
    #[prost(double, tag = "1")]
    pub lat: f64,
    #[prost(double, tag = "2")]
    pub lng: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Stop {
    #[prost(message, optional, tag = "1")]
    pub location: ::core::option::Option<GeoPoint>,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Delivery {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub client_id: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "3")]
    pub courier_id: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "4")]
    pub pickup: ::core::option::Option<Stop>,
    #[prost(message, optional, tag = "5")]
    pub dropoff: ::core::option::Option<Stop>,
    #[prost(int64, tag = "6")]
    pub proposed_price: i64,
    #[prost(int64, optional, tag = "7")]
    pub final_price: ::core::option::Option<i64>,
    #[prost(string, tag = "8")]
    pub status: ::prost::alloc::string::String,
    #[prost(double, tag = "9")]
    pub distance_km: f64,
    #[prost(int64, tag = "10")]
    pub duration_secs: i64,
    #[prost(string, tag = "11")]
    pub created_at: ::prost::alloc::string::String,
    #[prost(string, tag = "12")]
    pub updated_at: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bid {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub delivery_id: i64,
    #[prost(string, tag = "3")]
    pub courier_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "4")]
    pub amount: i64,
    #[prost(string, tag = "5")]
    pub note: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub status: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub updated_at: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateDeliveryRequest {
    #[prost(message, optional, tag = "1")]
    pub pickup: ::core::option::Option<Stop>,
    #[prost(message, optional, tag = "2")]
    pub dropoff: ::core::option::Option<Stop>,
    #[prost(int64, tag = "3")]
    pub proposed_price: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDeliveryRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListOpenDeliveriesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListDeliveriesResponse {
    #[prost(message, repeated, tag = "1")]
    pub deliveries: ::prost::alloc::vec::Vec<Delivery>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubmitBidRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(int64, tag = "2")]
    pub amount: i64,
    #[prost(string, tag = "3")]
    pub note: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AcceptBidRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(int64, tag = "2")]
    pub bid_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssignCourierRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(string, tag = "2")]
    pub courier_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub price: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdvanceStatusRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(string, tag = "2")]
    pub status: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishPositionRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(message, optional, tag = "2")]
    pub position: ::core::option::Option<GeoPoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PositionEvent {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
    #[prost(message, optional, tag = "2")]
    pub position: ::core::option::Option<GeoPoint>,
    #[prost(string, tag = "3")]
    pub recorded_at: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchPositionsRequest {
    #[prost(int64, tag = "1")]
    pub delivery_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LiveEvent {
    #[prost(message, optional, tag = "1")]
    pub position: ::core::option::Option<PositionEvent>,
    #[prost(string, tag = "2")]
    pub closed_reason: ::prost::alloc::string::String,
}

pub mod dispatch_service_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;

    #[tonic::async_trait]
    pub trait DispatchService: Send + Sync + 'static {
        async fn create_delivery(
            &self,
            request: tonic::Request<super::CreateDeliveryRequest>,
        ) -> std::result::Result<tonic::Response<super::Delivery>, tonic::Status>;
        async fn get_delivery(
            &self,
            request: tonic::Request<super::GetDeliveryRequest>,
        ) -> std::result::Result<tonic::Response<super::Delivery>, tonic::Status>;
        async fn list_open_deliveries(
            &self,
            request: tonic::Request<super::ListOpenDeliveriesRequest>,
        ) -> std::result::Result<tonic::Response<super::ListDeliveriesResponse>, tonic::Status>;
        async fn submit_bid(
            &self,
            request: tonic::Request<super::SubmitBidRequest>,
        ) -> std::result::Result<tonic::Response<super::Bid>, tonic::Status>;
        async fn accept_bid(
            &self,
            request: tonic::Request<super::AcceptBidRequest>,
        ) -> std::result::Result<tonic::Response<super::Delivery>, tonic::Status>;
        async fn assign_courier(
            &self,
            request: tonic::Request<super::AssignCourierRequest>,
        ) -> std::result::Result<tonic::Response<super::Delivery>, tonic::Status>;
        async fn advance_status(
            &self,
            request: tonic::Request<super::AdvanceStatusRequest>,
        ) -> std::result::Result<tonic::Response<super::Delivery>, tonic::Status>;
        async fn publish_position(
            &self,
            request: tonic::Request<super::PublishPositionRequest>,
        ) -> std::result::Result<tonic::Response<super::PositionEvent>, tonic::Status>;
        type WatchPositionsStream: tonic::codegen::tokio_stream::Stream<
                Item = std::result::Result<super::LiveEvent, tonic::Status>,
            > + Send
            + 'static;
        async fn watch_positions(
            &self,
            request: tonic::Request<super::WatchPositionsRequest>,
        ) -> std::result::Result<tonic::Response<Self::WatchPositionsStream>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct DispatchServiceServer<T: DispatchService> {
        inner: Arc<T>,
    }

    impl<T: DispatchService> DispatchServiceServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: DispatchService> Clone for DispatchServiceServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }

    impl<T, B> tonic::codegen::Service<http::Request<B>> for DispatchServiceServer<T>
    where
        T: DispatchService,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/dispatch.v1.DispatchService/CreateDelivery" => {
                    #[allow(non_camel_case_types)]
                    struct CreateDeliverySvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::CreateDeliveryRequest> for CreateDeliverySvc<T> {
                        type Response = super::Delivery;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::CreateDeliveryRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.create_delivery(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = CreateDeliverySvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/GetDelivery" => {
                    #[allow(non_camel_case_types)]
                    struct GetDeliverySvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::GetDeliveryRequest> for GetDeliverySvc<T> {
                        type Response = super::Delivery;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::GetDeliveryRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.get_delivery(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = GetDeliverySvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/ListOpenDeliveries" => {
                    #[allow(non_camel_case_types)]
                    struct ListOpenDeliveriesSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::ListOpenDeliveriesRequest> for ListOpenDeliveriesSvc<T> {
                        type Response = super::ListDeliveriesResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::ListOpenDeliveriesRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.list_open_deliveries(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = ListOpenDeliveriesSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/SubmitBid" => {
                    #[allow(non_camel_case_types)]
                    struct SubmitBidSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::SubmitBidRequest> for SubmitBidSvc<T> {
                        type Response = super::Bid;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::SubmitBidRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.submit_bid(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = SubmitBidSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/AcceptBid" => {
                    #[allow(non_camel_case_types)]
                    struct AcceptBidSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::AcceptBidRequest> for AcceptBidSvc<T> {
                        type Response = super::Delivery;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::AcceptBidRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.accept_bid(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = AcceptBidSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/AssignCourier" => {
                    #[allow(non_camel_case_types)]
                    struct AssignCourierSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::AssignCourierRequest> for AssignCourierSvc<T> {
                        type Response = super::Delivery;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::AssignCourierRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.assign_courier(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = AssignCourierSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/AdvanceStatus" => {
                    #[allow(non_camel_case_types)]
                    struct AdvanceStatusSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::AdvanceStatusRequest> for AdvanceStatusSvc<T> {
                        type Response = super::Delivery;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::AdvanceStatusRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.advance_status(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = AdvanceStatusSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/PublishPosition" => {
                    #[allow(non_camel_case_types)]
                    struct PublishPositionSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService> tonic::server::UnaryService<super::PublishPositionRequest> for PublishPositionSvc<T> {
                        type Response = super::PositionEvent;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::PublishPositionRequest>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.publish_position(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = PublishPositionSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    })
                }
                "/dispatch.v1.DispatchService/WatchPositions" => {
                    #[allow(non_camel_case_types)]
                    struct WatchPositionsSvc<T: DispatchService>(pub Arc<T>);
                    impl<T: DispatchService>
                        tonic::server::ServerStreamingService<super::WatchPositionsRequest>
                        for WatchPositionsSvc<T>
                    {
                        type Response = super::LiveEvent;
                        type ResponseStream = T::WatchPositionsStream;
                        type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::WatchPositionsRequest>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.watch_positions(request).await })
                        }
                    }
                    Box::pin(async move {
                        let method = WatchPositionsSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.server_streaming(method, req).await;
                        Ok(res)
                    })
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }

    impl<T: DispatchService> tonic::server::NamedService for DispatchServiceServer<T> {
        const NAME: &'static str = "dispatch.v1.DispatchService";
    }
}
