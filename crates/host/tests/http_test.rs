// Copyright 2025 Dougless Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client/server behavior over real sockets on ephemeral ports.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use dougless_base::{NativeFunction, ObjectRef, Value};
use dougless_host::http::HttpModule;
use dougless_permissions::PermissionManager;
use dougless_test_support::{TestLoop, free_port};
use parking_lot::Mutex;

fn call_member(object: &ObjectRef, name: &str, args: &[Value]) -> Result<Value, Value> {
    object
        .get(name)
        .and_then(|member| member.as_function().cloned())
        .expect("callable member")
        .call(args)
}

async fn get_with_retry(url: &str) -> reqwest::Response {
    for _ in 0..100 {
        match reqwest::get(url).await {
            Ok(response) => return response,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    panic!("server at {url} never came up");
}

#[tokio::test]
async fn server_runs_script_handler_and_writes_its_response() {
    let test_loop = TestLoop::start();
    let module = HttpModule::new(test_loop.handle(), Arc::new(PermissionManager::allow_all()));

    let handler = NativeFunction::new("handler", |args| {
        let request = args[0].as_object().unwrap().clone();
        let response = args[1].as_object().unwrap().clone();
        let url = request.get("url").unwrap();

        call_member(&response, "setHeader", &[
            Value::string("x-served-by"),
            Value::string("dougless"),
        ])?;
        call_member(&response, "writeHead", &[Value::Number(201.0)])?;
        call_member(&response, "end", &[Value::string(format!("handled {url}"))])?;
        Ok(Value::Undefined)
    });

    let server = module.create_server(handler);
    let port = free_port();
    server.listen(Some("127.0.0.1".to_string()), port, None);

    let response = get_with_retry(&format!("http://127.0.0.1:{port}/widget?q=1")).await;
    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(
        response
            .headers()
            .get("x-served-by")
            .and_then(|v| v.to_str().ok()),
        Some("dougless")
    );
    assert_eq!(response.text().await.unwrap(), "handled /widget?q=1");

    server.close();
    assert!(test_loop.drain(Duration::from_secs(10)));
}

#[tokio::test]
async fn handler_that_never_ends_times_out_as_504() {
    let test_loop = TestLoop::start();
    let module = HttpModule::new(test_loop.handle(), Arc::new(PermissionManager::allow_all()));

    // The handler drops the response object without calling end().
    let handler = NativeFunction::new("handler", |_| Ok(Value::Undefined));
    let server = module.create_server(handler);
    server.set_handler_timeout(Duration::from_millis(250));

    let port = free_port();
    server.listen(Some("127.0.0.1".to_string()), port, None);

    let response = get_with_retry(&format!("http://127.0.0.1:{port}/")).await;
    assert_eq!(response.status().as_u16(), 504);

    server.close();
    assert!(test_loop.drain(Duration::from_secs(10)));
}

#[tokio::test]
async fn client_reaches_script_server_with_callback() {
    let test_loop = TestLoop::start();
    let permissions = Arc::new(PermissionManager::allow_all());
    let module = HttpModule::new(test_loop.handle(), Arc::clone(&permissions));

    let handler = NativeFunction::new("handler", |args| {
        let response = args[1].as_object().unwrap().clone();
        call_member(&response, "end", &[Value::string("pong")])?;
        Ok(Value::Undefined)
    });
    let server = module.create_server(handler);
    let port = free_port();
    server.listen(Some("127.0.0.1".to_string()), port, None);
    // Wait for the bind before driving the client through the engine.
    get_with_retry(&format!("http://127.0.0.1:{port}/")).await;

    let slot: Arc<Mutex<Option<Result<Value, Value>>>> = Arc::new(Mutex::new(None));
    let callback = {
        let slot = Arc::clone(&slot);
        NativeFunction::new("callback", move |args| {
            let result = match args {
                [Value::Null, data] => Ok(data.clone()),
                [error, ..] => Err(error.clone()),
                [] => Ok(Value::Undefined),
            };
            *slot.lock() = Some(result);
            Ok(Value::Undefined)
        })
    };
    module.get(format!("http://127.0.0.1:{port}/ping"), Some(callback));

    let mut waited = 0;
    while slot.lock().is_none() && waited < 250 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }
    let response = slot
        .lock()
        .clone()
        .expect("client callback fired")
        .expect("request succeeded");
    let response = response.as_object().unwrap().clone();
    assert_eq!(response.get("statusCode"), Some(Value::Number(200.0)));
    assert_eq!(response.get("body"), Some(Value::string("pong")));

    server.close();
    assert!(test_loop.drain(Duration::from_secs(10)));
}

#[tokio::test]
async fn denied_client_request_performs_no_io() {
    let test_loop = TestLoop::start();
    let module = HttpModule::new(test_loop.handle(), Arc::new(PermissionManager::new()));

    // An independent counting listener: every accepted connection bumps the
    // counter. It runs on its own thread, outside every tokio runtime.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            while let Ok((stream, _)) = listener.accept() {
                hits.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
    }

    let slot: Arc<Mutex<Option<Result<Value, Value>>>> = Arc::new(Mutex::new(None));
    let callback = {
        let slot = Arc::clone(&slot);
        NativeFunction::new("callback", move |args| {
            let result = match args {
                [Value::Null, data] => Ok(data.clone()),
                [error, ..] => Err(error.clone()),
                [] => Ok(Value::Undefined),
            };
            *slot.lock() = Some(result);
            Ok(Value::Undefined)
        })
    };
    module.get(format!("http://127.0.0.1:{port}/"), Some(callback));

    let mut waited = 0;
    while slot.lock().is_none() && waited < 250 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }
    let error = slot
        .lock()
        .clone()
        .expect("client callback fired")
        .expect_err("request must be denied");
    assert!(error.as_str().unwrap().contains("Permission denied"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert!(test_loop.drain(Duration::from_secs(10)));
}
