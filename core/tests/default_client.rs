//! The process-wide client, configured once before first use.

use feather::{Callback, Client, HttpMethod, Options, RequestOptions, NO_PROXY};
use mock_server::Reply;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

// Single test: the default client can only be installed once per process.
#[test]
fn default_client_serves_free_functions() {
    let base = start_server();
    let client = Client::new(Options {
        base_uri: Some(base),
        proxy: Some(NO_PROXY.to_string()),
        ..Options::default()
    });
    feather::set_default_client(client).unwrap();

    let mut reply = Reply {
        code: 1,
        message: String::new(),
    };
    feather::get("/ok")
        .unwrap()
        .then(Callback::decode_into(&mut reply))
        .unwrap();
    assert_eq!(reply.code, 0);

    let outcome = feather::request(HttpMethod::Get, "/status/204", RequestOptions::new())
        .unwrap()
        .into_outcome();
    assert!(outcome.is_ok());
    assert_eq!(outcome.status(), Some(204));

    // Already initialised: the replacement is handed back.
    assert!(feather::set_default_client(Client::default()).is_err());
    assert!(feather::default_client().options().base_uri.is_some());
}
