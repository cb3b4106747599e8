use {
  gobject_list::{ObjectHost, ObjectId, SimulatedHost, Tracker},
  std::{io, sync::Arc},
  tracing_subscriber::EnvFilter,
};

fn create(host: &SimulatedHost, tracker: &Tracker, type_name: &str) -> ObjectId {
  let object = host.allocate(type_name);
  tracker.object_created(object);
  object
}

fn ref_object(host: &SimulatedHost, tracker: &Tracker, object: ObjectId) {
  if let Some(before) = host.ref_object(object) {
    tracker.object_reffed(object, before);
  }
}

fn unref_object(host: &SimulatedHost, tracker: &Tracker, object: ObjectId) {
  if let Some(before) = host.ref_count(object) {
    tracker.object_unreffed(object, before);
    host.unref_object(object);
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("GOBJECT_LIST_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn")),
    )
    .with_writer(io::stderr)
    .init();

  let host = Arc::new(SimulatedHost::with_address_reuse());
  let tracker = Tracker::new(host.clone());

  #[cfg(unix)]
  if let Err(err) = gobject_list::signals::install(tracker.clone()) {
    tracing::warn!(%err, "introspection signals unavailable");
  }

  let pipeline = create(&host, &tracker, "GstPipeline");
  let source = create(&host, &tracker, "GstAudioTestSrc");
  let _sink = create(&host, &tracker, "GstFakeSink");

  tracker.checkpoint();

  ref_object(&host, &tracker, pipeline);
  for _ in 0..3 {
    let buffer = create(&host, &tracker, "GstBuffer");
    unref_object(&host, &tracker, buffer);
  }
  unref_object(&host, &tracker, pipeline);
  unref_object(&host, &tracker, source);

  let _bus = create(&host, &tracker, "GstBus");

  tracker.checkpoint();
  tracker.dump_live();

  #[cfg(not(unix))]
  tracker.dump_still_alive();
}
